use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EncodingError, InvalidSpan};

/// Control and placeholder codepoints live in the `0xF000` page.
pub const CODE_LINE_BREAK: u16 = 0xF000;
pub const CODE_PAGE_BREAK: u16 = 0xF001;

/// One codepoint of the on-device text encoding, mapped to one or more
/// textual renderings. The first rendering is used when decoding; every
/// rendering is accepted when encoding (full-width and ASCII aliases).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharDef {
    pub code: u16,
    pub renderings: Vec<String>,
}

/// Placeholders the device substitutes at display time. Each occupies a
/// fixed number of display cells regardless of the substituted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaceholderKind {
    Username,
    CharacterName,
    Value,
    Pronoun,
    Nickname,
    FriendName,
    /// Plain sentence ending ("...ndesu").
    EndingPlain,
    /// Question ending ("...ndesuka").
    EndingQuestion,
    /// Short question ending ("...desuka").
    EndingShort,
}

impl PlaceholderKind {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0xF002 => Self::Username,
            0xF003 => Self::CharacterName,
            0xF004 => Self::EndingPlain,
            0xF005 => Self::EndingQuestion,
            0xF006 => Self::EndingShort,
            0xF007 => Self::Value,
            0xF008 => Self::Pronoun,
            0xF009 => Self::Nickname,
            0xF00A => Self::FriendName,
            _ => return None,
        })
    }

    /// Display cells the substituted text occupies on screen.
    pub fn display_width(&self) -> usize {
        match self {
            Self::Username | Self::CharacterName | Self::Nickname | Self::FriendName => 10,
            Self::Pronoun => 6,
            Self::Value => 4,
            Self::EndingPlain | Self::EndingShort => 3,
            Self::EndingQuestion => 4,
        }
    }
}

/// Classification of one decoded codepoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Glyph(String),
    LineBreak,
    PageBreak,
    Placeholder(PlaceholderKind),
    /// Not mapped by the active table; rendered as an escaped hex token.
    Unmapped(u16),
}

/// The active codepoint table. The table is data (editable, importable);
/// every codec operation runs against an injected instance.
#[derive(Debug, Clone)]
pub struct CharTable {
    entries: Vec<CharDef>,
    by_code: HashMap<u16, usize>,
}

impl CharTable {
    pub fn from_entries(entries: Vec<CharDef>) -> Self {
        let by_code = entries.iter().enumerate().map(|(i, e)| (e.code, i)).collect();
        Self { entries, by_code }
    }

    /// The built-in table of the Japanese firmware, including the ASCII
    /// aliases of full-width forms.
    pub fn japanese() -> Self {
        Self::from_entries(
            JAPANESE
                .iter()
                .map(|(code, texts)| CharDef {
                    code: *code,
                    renderings: texts.iter().map(|t| t.to_string()).collect(),
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[CharDef] {
        &self.entries
    }

    fn rendering(&self, code: u16) -> Option<&str> {
        self.by_code
            .get(&code)
            .map(|i| self.entries[*i].renderings.first().map(String::as_str).unwrap_or(""))
    }

    /// Classify one codepoint.
    pub fn token(&self, code: u16) -> Token {
        if code == CODE_LINE_BREAK {
            return Token::LineBreak;
        }
        if code == CODE_PAGE_BREAK {
            return Token::PageBreak;
        }
        if let Some(kind) = PlaceholderKind::from_code(code) {
            return Token::Placeholder(kind);
        }
        match self.rendering(code) {
            Some(text) => Token::Glyph(text.to_string()),
            None => Token::Unmapped(code),
        }
    }

    /// Render a codepoint sequence. Unmapped codes come out as `[XXXX]`
    /// escape tokens; nothing is ever dropped.
    pub fn render(&self, codes: &[u16]) -> String {
        let mut out = String::new();
        for code in codes {
            match self.rendering(*code) {
                Some(text) => out.push_str(text),
                None => out.push_str(&escape_code(*code)),
            }
        }
        out
    }

    /// Encode text back to codepoints. Either the whole string encodes or
    /// the operation is rejected naming every offending span; no partial
    /// output is ever produced.
    pub fn encode(&self, text: &str) -> Result<Vec<u16>, EncodingError> {
        let mut codes = Vec::new();
        let mut spans = Vec::new();

        let mut pending = String::new();
        let mut pending_start = 0;
        for (position, ch) in text.chars().enumerate() {
            match ch {
                '{' | '<' => {
                    if !pending.is_empty() {
                        spans.push(InvalidSpan { position: pending_start, text: pending.clone() });
                        pending.clear();
                    }
                    pending_start = position;
                    pending.push(ch);
                }
                '}' | '>' => {
                    if pending.is_empty() {
                        pending_start = position;
                    }
                    pending.push(ch);
                    match self.code_for(&pending.to_lowercase()) {
                        Some(code) => codes.push(code),
                        None => spans.push(InvalidSpan { position: pending_start, text: pending.clone() }),
                    }
                    pending.clear();
                }
                _ if !pending.is_empty() => pending.push(ch),
                _ => match self.code_for(&ch.to_string()) {
                    Some(code) => codes.push(code),
                    None => spans.push(InvalidSpan { position, text: ch.to_string() }),
                },
            }
        }
        if !pending.is_empty() {
            spans.push(InvalidSpan { position: pending_start, text: pending });
        }

        if spans.is_empty() { Ok(codes) } else { Err(EncodingError::Unmapped { spans }) }
    }

    fn code_for(&self, text: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.renderings.iter().any(|r| r == text))
            .map(|e| e.code)
    }

    /// Validate a candidate replacement table against the codes currently
    /// in use. Rejects the import, naming the first code that would become
    /// unmapped, and rejects malformed or ambiguous renderings.
    pub fn validate_import(
        candidate: &CharTable,
        in_use: impl IntoIterator<Item = u16>,
    ) -> Result<(), EncodingError> {
        for entry in &candidate.entries {
            for text in &entry.renderings {
                let delimited = (text.starts_with('{') && text.ends_with('}'))
                    || (text.starts_with('<') && text.ends_with('>'));
                if text.chars().count() > 1 && !delimited {
                    return Err(EncodingError::InvalidRendering {
                        code: entry.code,
                        text: text.clone(),
                    });
                }
                if text.is_empty() {
                    continue;
                }
                if let Some(other) = candidate
                    .entries
                    .iter()
                    .find(|o| o.code != entry.code && o.renderings.contains(text))
                {
                    return Err(EncodingError::DuplicateRendering {
                        text: text.clone(),
                        first: entry.code,
                        second: other.code,
                    });
                }
            }
        }
        for code in in_use {
            if candidate.rendering(code).is_none() {
                return Err(EncodingError::ImportOrphansCode { code });
            }
        }
        Ok(())
    }
}

impl Default for CharTable {
    fn default() -> Self {
        Self::japanese()
    }
}

/// Escaped rendering of an unmapped codepoint, e.g. `[03F2]`.
pub fn escape_code(code: u16) -> String {
    format!("[{code:04X}]")
}

/// A codepoint sequence together with its rendering under the table that
/// decoded it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringValue {
    pub codes: Vec<u16>,
    pub text: String,
}

impl StringValue {
    pub fn from_codes(table: &CharTable, codes: Vec<u16>) -> Self {
        let text = table.render(&codes);
        Self { codes, text }
    }

    pub fn from_text(table: &CharTable, text: &str) -> Result<Self, EncodingError> {
        let codes = table.encode(text)?;
        Ok(Self { codes, text: text.to_string() })
    }

    /// Re-render after the active table changed (import).
    pub fn rerender(&mut self, table: &CharTable) {
        self.text = table.render(&self.codes);
    }
}

#[rustfmt::skip]
const JAPANESE: &[(u16, &[&str])] = &[
    (0x0000, &["█"]),
    (0x0001, &["　", " "]),
    (0x0002, &["０", "0"]), (0x0003, &["１", "1"]), (0x0004, &["２", "2"]),
    (0x0005, &["３", "3"]), (0x0006, &["４", "4"]), (0x0007, &["５", "5"]),
    (0x0008, &["６", "6"]), (0x0009, &["７", "7"]), (0x000A, &["８", "8"]),
    (0x000B, &["９", "9"]),
    (0x000C, &["＋", "+"]), (0x000D, &["－", "-"]), (0x000E, &["↵"]),
    (0x000F, &["あ"]), (0x0010, &["い"]), (0x0011, &["う"]), (0x0012, &["え"]), (0x0013, &["お"]),
    (0x0014, &["か"]), (0x0015, &["き"]), (0x0016, &["く"]), (0x0017, &["け"]), (0x0018, &["こ"]),
    (0x0019, &["さ"]), (0x001A, &["し"]), (0x001B, &["す"]), (0x001C, &["せ"]), (0x001D, &["そ"]),
    (0x001E, &["た"]), (0x001F, &["ち"]), (0x0020, &["つ"]), (0x0021, &["て"]), (0x0022, &["と"]),
    (0x0023, &["な"]), (0x0024, &["に"]), (0x0025, &["ぬ"]), (0x0026, &["ね"]), (0x0027, &["の"]),
    (0x0028, &["は"]), (0x0029, &["ひ"]), (0x002A, &["ふ"]), (0x002B, &["へ"]), (0x002C, &["ほ"]),
    (0x002D, &["ま"]), (0x002E, &["み"]), (0x002F, &["む"]), (0x0030, &["め"]), (0x0031, &["も"]),
    (0x0032, &["や"]), (0x0033, &["ゆ"]), (0x0034, &["よ"]),
    (0x0035, &["ら"]), (0x0036, &["り"]), (0x0037, &["る"]), (0x0038, &["れ"]), (0x0039, &["ろ"]),
    (0x003A, &["わ"]), (0x003B, &["を"]), (0x003C, &["ん"]),
    (0x003D, &["ぁ"]), (0x003E, &["ぃ"]), (0x003F, &["ぅ"]), (0x0040, &["ぇ"]), (0x0041, &["ぉ"]),
    (0x0042, &["っ"]), (0x0043, &["ゃ"]), (0x0044, &["ゅ"]), (0x0045, &["ょ"]),
    (0x0046, &["が"]), (0x0047, &["ぎ"]), (0x0048, &["ぐ"]), (0x0049, &["げ"]), (0x004A, &["ご"]),
    (0x004B, &["ざ"]), (0x004C, &["じ"]), (0x004D, &["ず"]), (0x004E, &["ぜ"]), (0x004F, &["ぞ"]),
    (0x0050, &["だ"]), (0x0051, &["ぢ"]), (0x0052, &["づ"]), (0x0053, &["で"]), (0x0054, &["ど"]),
    (0x0055, &["ば"]), (0x0056, &["び"]), (0x0057, &["ぶ"]), (0x0058, &["べ"]), (0x0059, &["ぼ"]),
    (0x005A, &["ぱ"]), (0x005B, &["ぴ"]), (0x005C, &["ぷ"]), (0x005D, &["ぺ"]), (0x005E, &["ぽ"]),
    (0x005F, &["ア"]), (0x0060, &["イ"]), (0x0061, &["ウ"]), (0x0062, &["エ"]), (0x0063, &["オ"]),
    (0x0064, &["カ"]), (0x0065, &["キ"]), (0x0066, &["ク"]), (0x0067, &["ケ"]), (0x0068, &["コ"]),
    (0x0069, &["サ"]), (0x006A, &["シ"]), (0x006B, &["ス"]), (0x006C, &["セ"]), (0x006D, &["ソ"]),
    (0x006E, &["タ"]), (0x006F, &["チ"]), (0x0070, &["ツ"]), (0x0071, &["テ"]), (0x0072, &["ト"]),
    (0x0073, &["ナ"]), (0x0074, &["ニ"]), (0x0075, &["ヌ"]), (0x0076, &["ネ"]), (0x0077, &["ノ"]),
    (0x0078, &["ハ"]), (0x0079, &["ヒ"]), (0x007A, &["フ"]), (0x007B, &["ヘ"]), (0x007C, &["ホ"]),
    (0x007D, &["マ"]), (0x007E, &["ミ"]), (0x007F, &["ム"]), (0x0080, &["メ"]), (0x0081, &["モ"]),
    (0x0082, &["ヤ"]), (0x0083, &["ユ"]), (0x0084, &["ヨ"]),
    (0x0085, &["ラ"]), (0x0086, &["リ"]), (0x0087, &["ル"]), (0x0088, &["レ"]), (0x0089, &["ロ"]),
    (0x008A, &["ワ"]), (0x008B, &["ヲ"]), (0x008C, &["ン"]),
    (0x008D, &["ァ"]), (0x008E, &["ィ"]), (0x008F, &["ゥ"]), (0x0090, &["ェ"]), (0x0091, &["ォ"]),
    (0x0092, &["ッ"]), (0x0093, &["ャ"]), (0x0094, &["ュ"]), (0x0095, &["ョ"]),
    (0x0096, &["ガ"]), (0x0097, &["ギ"]), (0x0098, &["グ"]), (0x0099, &["ゲ"]), (0x009A, &["ゴ"]),
    (0x009B, &["ザ"]), (0x009C, &["ジ"]), (0x009D, &["ズ"]), (0x009E, &["ゼ"]), (0x009F, &["ゾ"]),
    (0x00A0, &["ダ"]), (0x00A1, &["ヂ"]), (0x00A2, &["ヅ"]), (0x00A3, &["デ"]), (0x00A4, &["ド"]),
    (0x00A5, &["バ"]), (0x00A6, &["ビ"]), (0x00A7, &["ブ"]), (0x00A8, &["ベ"]), (0x00A9, &["ボ"]),
    (0x00AA, &["パ"]), (0x00AB, &["ピ"]), (0x00AC, &["プ"]), (0x00AD, &["ペ"]), (0x00AE, &["ポ"]),
    (0x00AF, &["ヴ"]),
    (0x00B0, &["ー", "—", "–"]), (0x00B1, &["～", "~"]), (0x00B2, &["…"]),
    (0x00B3, &["、", ","]), (0x00B4, &["。"]),
    (0x00B5, &["（", "("]), (0x00B6, &["）", ")"]),
    (0x00B7, &["「", "“"]), (0x00B8, &["」", "”"]),
    (0x00B9, &["．", "."]), (0x00BA, &["•"]),
    (0x00BB, &["！", "!"]), (0x00BC, &["？", "?"]), (0x00BD, &["＆", "&"]),
    (0x00BE, &["〇", "○"]), (0x00BF, &["✕"]), (0x00C0, &["♥"]), (0x00C1, &["☼"]),
    (0x00C2, &["★", "*"]), (0x00C3, &["🌀"]), (0x00C4, &["♪"]), (0x00C5, &["💢"]),
    (0x00C6, &["⤴"]), (0x00C7, &["⤵"]), (0x00C8, &["→"]), (0x00C9, &["←"]),
    (0x00CA, &["＄", "$"]), (0x00CB, &["％", "%"]),
    (0x00CC, &["Ａ", "A", "a"]), (0x00CD, &["Ｂ", "B", "b"]), (0x00CE, &["Ｃ", "C", "c"]),
    (0x00CF, &["Ｄ", "D", "d"]), (0x00D0, &["Ｅ", "E", "e"]), (0x00D1, &["Ｆ", "F", "f"]),
    (0x00D2, &["Ｇ", "G", "g"]), (0x00D3, &["Ｈ", "H", "h"]), (0x00D4, &["Ｉ", "I", "i"]),
    (0x00D5, &["Ｊ", "J", "j"]), (0x00D6, &["Ｋ", "K", "k"]), (0x00D7, &["Ｌ", "L", "l"]),
    (0x00D8, &["Ｍ", "M", "m"]), (0x00D9, &["Ｎ", "N", "n"]), (0x00DA, &["Ｏ", "O", "o"]),
    (0x00DB, &["Ｐ", "P", "p"]), (0x00DC, &["Ｑ", "Q", "q"]), (0x00DD, &["Ｒ", "R", "r"]),
    (0x00DE, &["Ｓ", "S", "s"]), (0x00DF, &["Ｔ", "T", "t"]), (0x00E0, &["Ｕ", "U", "u"]),
    (0x00E1, &["Ｖ", "V", "v"]), (0x00E2, &["Ｗ", "W", "w"]), (0x00E3, &["Ｘ", "X", "x"]),
    (0x00E4, &["Ｙ", "Y", "y"]), (0x00E5, &["Ｚ", "Z", "z"]),
    (0x00E6, &["¡"]), (0x00E7, &["_"]), (0x00E8, &["†"]),
    (0x00E9, &["😄"]), (0x00EA, &["😣"]), (0x00EB, &["😤"]), (0x00EC, &["😑"]),
    (0x00ED, &["😵"]), (0x00EE, &["😢"]), (0x00EF, &["🐱"]), (0x00F0, &["⏱"]),
    (0x00F1, &["🎂"]), (0x00F2, &["🎁"]), (0x00F3, &["📱"]), (0x00F4, &["🏢"]),
    (0x00F5, &["💼"]), (0x00F6, &["🍙"]), (0x00F7, &["🍰"]), (0x00F8, &["✨"]),
    (0x00F9, &["🟥"]),
    (0xF000, &["<br>"]),
    (0xF001, &["<hr>"]),
    (0xF002, &["{username}"]),
    (0xF003, &["{charname}"]),
    (0xF004, &["{statement}"]),
    (0xF005, &["{question1}"]),
    (0xF006, &["{question2}"]),
    (0xF007, &["{variable}"]),
    (0xF008, &["{pronoun}"]),
    (0xF009, &["{nickname}"]),
    (0xF00A, &["{friend}"]),
];
