pub mod archive;
pub mod bits;
pub mod card;
pub mod data;
pub mod error;
pub mod firmware;
pub mod schema;
pub mod session;
pub mod sprite;
pub mod text;
pub mod view;

pub use error::{Error, Result};
pub use schema::BinShape;
pub use session::{BinImage, Session, Snapshot, decode_image};
