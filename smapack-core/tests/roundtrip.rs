//! End-to-end round trips over complete synthetic images: a card (scanned
//! archive) and a firmware dump (fixed regions), decoded through the
//! public session API and re-encoded byte-exactly.

use std::collections::BTreeMap;

use smapack_core::archive::SIGNATURE;
use smapack_core::bits::SpriteAttrs;
use smapack_core::card;
use smapack_core::data::{
    Animations, DataPack, DialogString, EntityId, Item, ParticleEmitter,
    frame::{Compositions, FrameFields, FrameLayer, FrameRef, FrameTable},
    item::ItemKind,
    scene::{LayerFields, Scene, SceneLayer},
};
use smapack_core::firmware;
use smapack_core::schema::{BinShape, GroupEntry};
use smapack_core::sprite::{Color, ImageDef, Palette, SpritePack, Subimage};
use smapack_core::text::{CharTable, StringValue};
use smapack_core::view::BufView;
use smapack_core::{BinImage, Session};

const ARCHIVE_OFFSET: usize = 0x1000;
/// First package starts right after the two 16-byte table strides.
const FIRST_PACKAGE: usize = 40;

fn sample_data_pack(shape: BinShape, chars: &CharTable) -> DataPack {
    let animations = match shape {
        BinShape::Card => Animations::Compositions(Compositions {
            sequences: vec![vec![0x0101, 0x0202], vec![0x0303], vec![]],
            entries: vec![
                GroupEntry { start: 0, len: 2 },
                GroupEntry { start: 0xFFFF, len: 0 },
            ],
        }),
        BinShape::Firmware => Animations::Frames(FrameTable {
            layers: vec![FrameLayer {
                fields: FrameFields::X | FrameFields::SUBIMAGE,
                x: 3,
                subimage_index: 1,
                ..FrameLayer::default()
            }],
            frames: vec![FrameRef { start: 0, count: 1 }, FrameRef { start: 0xFFFF, count: 0 }],
        }),
    };

    DataPack {
        shape,
        card_id: 5,
        card_id_tail: vec![0xDEAD, 0xBEEF],
        emitters: vec![ParticleEmitter { words: (0..33).collect() }],
        scenes: vec![Scene {
            layers: vec![SceneLayer {
                fields: LayerFields::X | LayerFields::Y | LayerFields::IMAGE,
                x: 10,
                y: -4,
                image_id: Some(EntityId { card_id: Some(5), entity_id: 0 }),
                ..SceneLayer::default()
            }],
        }],
        strings: vec![DialogString {
            id: EntityId { card_id: None, entity_id: 1 },
            unknown1: 0,
            unknown2: 0,
            unknown3: 0,
            value: StringValue::from_text(chars, "こんにちは").unwrap(),
        }],
        table9: vec![vec![7, 8], vec![]],
        items: vec![Item {
            id: EntityId { card_id: Some(5), entity_id: 1 },
            kind: ItemKind::Snack,
            name: StringValue::from_text(chars, "ケーキ").unwrap(),
            image_id: Some(EntityId { card_id: Some(5), entity_id: 0 }),
            worn_image_id: None,
            close_image_id: None,
            animation_id: None,
            price: 120,
            unknown1: 0,
            unknown2: 0,
            unknown3: 0,
            unlocked_character: None,
            game_kind: None,
        }],
        characters: Vec::new(),
        graphics_nodes: vec![vec![0x8500, 0x0001], vec![]],
        animations,
        raw_tables: BTreeMap::new(),
    }
}

fn sample_sprite_pack() -> SpritePack {
    let attrs = SpriteAttrs::from_word(0).unwrap(); // 8x8, 2 bpp
    let pack = SpritePack {
        image_defs: vec![ImageDef {
            subimage_start: 0,
            width: 2,
            height: 1,
            palette_start: 0,
            frame_count: 1,
        }],
        subimages: (0..2)
            .map(|n| Subimage {
                char_number: n,
                offset_x: -8 + n as i16,
                offset_y: 0,
                attrs,
                pixels: (0..attrs.pixel_count() as u16).map(|p| p % 4).collect(),
            })
            .collect(),
        palettes: vec![Palette {
            colors: [
                Color { alpha: true, r: 0, g: 0, b: 0 },
                Color { alpha: false, r: 248, g: 248, b: 248 },
                Color { alpha: false, r: 96, g: 160, b: 32 },
                Color { alpha: false, r: 8, g: 16, b: 224 },
            ],
        }],
        char_data: vec![0u8; 32],
    };
    // Settle the char-data backing so the model matches its own encoding.
    let bytes = pack.encode().unwrap();
    SpritePack::decode(&BufView::new(&bytes)).unwrap()
}

fn build_card_image(chars: &CharTable) -> Vec<u8> {
    let data_bytes = sample_data_pack(BinShape::Card, chars).encode().unwrap();
    let sprite_bytes = sample_sprite_pack().encode().unwrap();

    let mut buf = vec![0u8; 80];
    buf[0..2].copy_from_slice(&64u16.to_le_bytes()); // sector count
    buf[16..26].copy_from_slice(b"TAMAGOTCHI");
    buf[32..37].copy_from_slice(b"SMART");
    buf[50..52].copy_from_slice(&5u16.to_le_bytes()); // card id
    buf[54..56].copy_from_slice(&2021u16.to_le_bytes());
    buf[56..58].copy_from_slice(&11u16.to_le_bytes());
    buf[58..60].copy_from_slice(&16u16.to_le_bytes());
    buf.resize(ARCHIVE_OFFSET, 0);

    // Archive: signature word, package count, two package entries.
    buf.extend_from_slice(&SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    let data_offset = FIRST_PACKAGE as u32;
    let sprite_offset = data_offset + data_bytes.len() as u32;
    buf.extend_from_slice(&data_offset.to_le_bytes()); // base+8
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&(data_bytes.len() as u32).to_le_bytes()); // base+16
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&sprite_offset.to_le_bytes()); // base+24
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&(sprite_bytes.len() as u32).to_le_bytes()); // base+32
    buf.extend_from_slice(&[0u8; 4]); // pad to base+40
    buf.extend_from_slice(&data_bytes);
    buf.extend_from_slice(&sprite_bytes);
    buf
}

#[test]
fn card_image_round_trips_byte_exactly() {
    let chars = CharTable::japanese();
    let buf = build_card_image(&chars);

    let decoded = card::read_card(&buf, &chars).unwrap();
    assert!(decoded.pack_errors.is_empty());
    assert!(decoded.faults.is_empty());
    assert_eq!(decoded.header.vendor(), "TAMAGOTCHI");
    assert_eq!(decoded.header.card_id, 5);
    assert_eq!(decoded.archive.base, ARCHIVE_OFFSET);

    let data_pack = decoded.data_pack.as_ref().unwrap();
    assert_eq!(data_pack.card_id, 5);
    assert_eq!(data_pack.strings[0].value.text, "こんにちは");
    assert_eq!(data_pack.items[0].name.text, "ケーキ");

    let sprite_pack = decoded.sprite_pack.as_ref().unwrap();
    assert_eq!(sprite_pack.image_defs.len(), 1);
    assert_eq!(sprite_pack.subimages.len(), 2);

    let rewritten =
        card::write_card(&buf, &decoded.archive, data_pack, sprite_pack).unwrap();
    assert_eq!(rewritten, buf);
}

#[test]
fn session_commit_changes_only_the_edited_package() {
    let chars = CharTable::japanese();
    let buf = build_card_image(&chars);

    let session = Session::open(buf.clone(), chars).unwrap();
    let before = session.snapshot();

    let after = session
        .commit(|data, _sprite| {
            data.items[0].price = 999;
            Ok(())
        })
        .unwrap();

    // Readers holding the earlier snapshot still see the old state.
    match (&before.image, &after.image) {
        (BinImage::Card(old), BinImage::Card(new)) => {
            assert_eq!(old.data_pack.as_ref().unwrap().items[0].price, 120);
            assert_eq!(new.data_pack.as_ref().unwrap().items[0].price, 999);
        }
        other => panic!("unexpected images: {other:?}"),
    }

    // Same sizes, so the buffers differ in exactly one word.
    assert_eq!(before.buffer.len(), after.buffer.len());
    let diffs: Vec<usize> = (0..before.buffer.len())
        .filter(|i| before.buffer[*i] != after.buffer[*i])
        .collect();
    assert_eq!(diffs.len(), 2);
    assert_eq!(diffs[1], diffs[0] + 1);

    // A failed edit must leave the prior snapshot current.
    let failed = session.commit(|data, _| {
        data.items[0].name =
            StringValue { codes: vec![1; 11], text: String::new() };
        Ok(())
    });
    assert!(failed.is_err());
    assert_eq!(
        session.snapshot().buffer,
        after.buffer,
        "failed commit must not publish a partial rewrite"
    );
}

#[test]
fn sprite_edit_repacks_pixel_bits() {
    let chars = CharTable::japanese();
    let buf = build_card_image(&chars);
    let session = Session::open(buf, chars).unwrap();

    let after = session
        .commit(|_data, sprite| {
            for pixel in &mut sprite.subimages[1].pixels {
                *pixel = 3;
            }
            Ok(())
        })
        .unwrap();

    let sprite = after.image.sprite_pack().unwrap();
    assert!(sprite.subimages[1].pixels.iter().all(|p| *p == 3));
    // 2 bpp, all ones: the second 16-byte run is solid 0xFF.
    let run = &sprite.char_data[16..32];
    assert!(run.iter().all(|b| *b == 0xFF));
}

#[test]
fn firmware_image_round_trips_byte_exactly() {
    let chars = CharTable::japanese();
    let data_bytes = sample_data_pack(BinShape::Firmware, &chars).encode().unwrap();
    let sprite_bytes = sample_sprite_pack().encode().unwrap();

    let mut buf = vec![0u8; firmware::DATA_PACK_START];
    buf[..firmware::SIGNATURE.len()].copy_from_slice(firmware::SIGNATURE);
    buf.extend_from_slice(&data_bytes);
    buf.resize(firmware::SPRITE_PACK_START, 0);
    buf.extend_from_slice(&sprite_bytes);

    let decoded = firmware::read_firmware(&buf, &chars).unwrap();
    assert!(decoded.pack_errors.is_empty());
    let data_pack = decoded.data_pack.as_ref().unwrap();
    match &data_pack.animations {
        Animations::Frames(frames) => {
            assert_eq!(frames.layers.len(), 1);
            assert!(frames.frames[1].is_implicit());
        }
        other => panic!("unexpected animations: {other:?}"),
    }
    // The region padding decodes into the undocumented tail and follows
    // the pack back out.
    assert!(data_pack.card_id_tail.len() > 2);

    let rewritten = firmware::write_firmware(
        &buf,
        data_pack,
        decoded.sprite_pack.as_ref().unwrap(),
    )
    .unwrap();
    assert_eq!(rewritten, buf);
}
