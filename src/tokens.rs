//! Vocabulary symbol tables and text rendering.
//!
//! Loaded from a `tokens.txt` resource with one `<piece> <id>` entry per
//! line. The piece may itself contain spaces; only the trailing token on a
//! line is the id.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const BLANK_SPELLINGS: &[&str] = &["<blk>", "<blank>", "<pad>"];
const START_SPELLINGS: &[&str] = &["<s>", "<sos>", "<bos>"];
const END_SPELLINGS: &[&str] = &["</s>", "<eos>"];

const DEFAULT_BLANK_ID: i64 = 0;
const DEFAULT_START_ID: i64 = 1;
const DEFAULT_END_ID: i64 = 2;

static WHITESPACE_RUN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"\s+"));

/// How subword pieces are joined into words when rendering text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRule {
    /// SentencePiece convention: a `▁` prefix marks a word boundary.
    SentencePiece,
    /// Subword-nmt convention: a trailing `@@` joins a piece to the next.
    BpeContinuation,
}

/// Immutable id → piece mapping with resolved sentinel ids.
pub struct SymbolTable {
    id_to_piece: HashMap<i64, String>,
    blank_id: i64,
    start_id: i64,
    end_id: i64,
    join_rule: JoinRule,
}

impl SymbolTable {
    /// Load a symbol table from a `tokens.txt` file.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        let table = Self::from_text(&contents);
        log::info!("loaded {} tokens from {:?}", table.id_to_piece.len(), path);
        Ok(table)
    }

    /// Parse a symbol table from vocabulary text.
    ///
    /// Blank lines are ignored; lines whose trailing token does not parse as
    /// an integer are skipped. Sentinel ids (blank/start/end) are resolved by
    /// a case-insensitive scan of piece spellings, defaulting to 0/1/2 when
    /// undetected; the blank id always gets a mapping entry even if the file
    /// has none.
    pub fn from_text(contents: &str) -> Self {
        let mut id_to_piece = HashMap::new();

        for line in contents.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            // Format: "piece id"; the piece can contain spaces.
            let parts: Vec<&str> = line.rsplitn(2, |c: char| c.is_whitespace()).collect();
            if parts.len() != 2 {
                continue;
            }
            if let Ok(id) = parts[0].parse::<i64>() {
                id_to_piece.insert(id, parts[1].to_string());
            }
        }

        let mut table = Self {
            id_to_piece,
            blank_id: DEFAULT_BLANK_ID,
            start_id: DEFAULT_START_ID,
            end_id: DEFAULT_END_ID,
            join_rule: JoinRule::SentencePiece,
        };
        table.resolve_conventions();
        table
    }

    /// Decode all base64-encoded piece spellings in place.
    ///
    /// Used for vocabularies that ship their pieces encoded; entries that
    /// fail to decode (e.g. `<blank>`) are left as-is. Sentinel ids and the
    /// join rule are re-resolved from the decoded spellings.
    pub fn apply_base64_decode(&mut self) {
        for piece in self.id_to_piece.values_mut() {
            if let Ok(bytes) = STANDARD.decode(piece.as_bytes()) {
                if let Ok(decoded) = String::from_utf8(bytes) {
                    *piece = decoded;
                }
            }
        }
        self.resolve_conventions();
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        self.id_to_piece.get(&id).map(|s| s.as_str())
    }

    pub fn blank_id(&self) -> i64 {
        self.blank_id
    }

    pub fn start_id(&self) -> i64 {
        self.start_id
    }

    pub fn end_id(&self) -> i64 {
        self.end_id
    }

    pub fn join_rule(&self) -> JoinRule {
        self.join_rule
    }

    /// Render a decoded id sequence as text.
    ///
    /// Meta pieces are skipped, pieces are joined per the detected rule, and
    /// the result is whitespace-normalized. An empty id sequence yields an
    /// empty string.
    pub fn decode(&self, ids: &[i64]) -> String {
        let mut text = String::new();

        match self.join_rule {
            JoinRule::SentencePiece => {
                for &id in ids {
                    let Some(piece) = self.get(id) else {
                        continue;
                    };
                    if is_meta_piece(piece) {
                        continue;
                    }
                    if let Some(stripped) = piece.strip_prefix('▁') {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(stripped);
                    } else {
                        text.push_str(piece);
                    }
                }
            }
            JoinRule::BpeContinuation => {
                let mut join_next = true;
                for &id in ids {
                    let Some(piece) = self.get(id) else {
                        continue;
                    };
                    if is_meta_piece(piece) {
                        continue;
                    }
                    let continues = piece.ends_with("@@");
                    let clean = piece.trim_end_matches("@@");
                    if !join_next && !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(clean);
                    join_next = continues;
                }
            }
        }

        normalize_whitespace(&text)
    }

    fn resolve_conventions(&mut self) {
        self.blank_id =
            find_sentinel(&self.id_to_piece, BLANK_SPELLINGS).unwrap_or(DEFAULT_BLANK_ID);
        self.start_id =
            find_sentinel(&self.id_to_piece, START_SPELLINGS).unwrap_or(DEFAULT_START_ID);
        self.end_id = find_sentinel(&self.id_to_piece, END_SPELLINGS).unwrap_or(DEFAULT_END_ID);

        // The decode automaton compares against the blank id on every frame;
        // it must map to something even when the file omits it.
        self.id_to_piece.entry(self.blank_id).or_default();

        self.join_rule = if self.id_to_piece.values().any(|p| p.ends_with("@@")) {
            JoinRule::BpeContinuation
        } else {
            JoinRule::SentencePiece
        };
    }
}

/// Pieces wrapped in `<...>`, `[...]`, or `<|...|>` are non-lexical markers.
///
/// Best-effort string matching on piece spelling; vocabularies with other
/// marker conventions pass through unfiltered.
pub fn is_meta_piece(piece: &str) -> bool {
    (piece.starts_with('<') && piece.ends_with('>'))
        || (piece.starts_with('[') && piece.ends_with(']'))
}

fn find_sentinel(map: &HashMap<i64, String>, spellings: &[&str]) -> Option<i64> {
    map.iter()
        .filter(|(_, piece)| {
            let lower = piece.to_lowercase();
            spellings.iter().any(|s| lower == *s)
        })
        .map(|(&id, _)| id)
        .min()
}

fn normalize_whitespace(text: &str) -> String {
    match &*WHITESPACE_RUN {
        Ok(re) => re.replace_all(text.trim(), " ").to_string(),
        Err(_) => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pieces_and_resolves_blank() {
        let table = SymbolTable::from_text("hello 5\n<blk> 0\n");
        assert_eq!(table.get(5), Some("hello"));
        assert_eq!(table.blank_id(), 0);
        assert_eq!(table.decode(&[0, 5, 0]), "hello");
    }

    #[test]
    fn sentinel_scan_is_case_insensitive() {
        let table = SymbolTable::from_text("<BLANK> 7\n<SOS> 3\n<EOS> 4\nword 9\n");
        assert_eq!(table.blank_id(), 7);
        assert_eq!(table.start_id(), 3);
        assert_eq!(table.end_id(), 4);
    }

    #[test]
    fn sentinels_default_when_undetected() {
        let table = SymbolTable::from_text("a 3\nb 4\n");
        assert_eq!(table.blank_id(), 0);
        assert_eq!(table.start_id(), 1);
        assert_eq!(table.end_id(), 2);
        // the blank id is given a mapping even though the file has none
        assert_eq!(table.get(0), Some(""));
    }

    #[test]
    fn piece_may_contain_spaces() {
        let table = SymbolTable::from_text("a b 7\n");
        assert_eq!(table.get(7), Some("a b"));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let table = SymbolTable::from_text("ok 1\n\nnot-a-pair\nbad id\n");
        assert_eq!(table.get(1), Some("ok"));
        assert_eq!(table.id_to_piece.len(), 2); // "ok" plus the ensured blank
    }

    #[test]
    fn sentencepiece_boundary_joins_words() {
        let table = SymbolTable::from_text("▁hel 3\nlo 4\n▁world 5\n");
        assert_eq!(table.decode(&[3, 4, 5]), "hello world");
    }

    #[test]
    fn bpe_continuation_joins_words() {
        let table = SymbolTable::from_text("ex@@ 3\nample 4\ntext 5\n");
        assert_eq!(table.join_rule(), JoinRule::BpeContinuation);
        assert_eq!(table.decode(&[3, 4, 5]), "example text");
    }

    #[test]
    fn meta_pieces_are_skipped() {
        let table =
            SymbolTable::from_text("<|en|> 3\n<unk> 4\n[PAD] 5\n▁hi 6\n");
        assert_eq!(table.decode(&[3, 4, 5, 6]), "hi");
    }

    #[test]
    fn decode_empty_sequence() {
        let table = SymbolTable::from_text("▁hi 3\n");
        assert_eq!(table.decode(&[]), "");
    }

    #[test]
    fn base64_pieces_decode_in_place() {
        // "aGVsbG8=" is "hello"; "<blank>" fails to decode and is kept
        let mut table = SymbolTable::from_text("aGVsbG8= 5\n<blank> 0\n");
        table.apply_base64_decode();
        assert_eq!(table.get(5), Some("hello"));
        assert_eq!(table.get(0), Some("<blank>"));
        assert_eq!(table.blank_id(), 0);
    }

    #[test]
    fn whitespace_is_normalized() {
        let table = SymbolTable::from_text("▁a 3\n▁ 4\n▁b 5\n");
        assert_eq!(table.decode(&[3, 4, 5]), "a b");
    }
}
