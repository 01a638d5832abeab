use ahash::AHashMap;
use rust_stemmers::{Algorithm, Stemmer};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Upper end of the positivity scale. Scores are expected in `[0, POSITIVITY_MAX]`.
pub const POSITIVITY_MAX: f64 = 9.0;

#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("Failed to read lexicon file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode lexicon row: {0}")]
    Csv(#[from] csv::Error),
    #[error("The lexicon contains no entries. A lexicon is required to score documents.")]
    Empty,
    #[error("Lexicon word '{word}' has score {score}, outside the [0, 9] positivity scale.")]
    ScoreOutOfRange { word: String, score: f64 },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LexiconEntry {
    pub word: String,
    pub positivity: f64,
    #[serde(default)]
    pub affect: Option<String>,
}

/// Read-only word table. Lookups try the exact word first, then its stem against the
/// exact words, then the stem against the stems of the lexicon's own words.
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
    exact: AHashMap<String, usize>,
    stemmed: AHashMap<String, usize>,
    stemmer: Stemmer,
}

impl Lexicon {
    pub fn from_entries(raw: Vec<LexiconEntry>) -> Result<Self, LexiconError> {
        let stemmer = Stemmer::create(Algorithm::English);
        let mut entries = Vec::with_capacity(raw.len());
        let mut exact = AHashMap::with_capacity(raw.len());
        let mut stemmed = AHashMap::with_capacity(raw.len());

        for entry in raw {
            let word = entry.word.trim().to_lowercase();
            if word.is_empty() {
                continue;
            }
            if !entry.positivity.is_finite()
                || entry.positivity < 0.0
                || entry.positivity > POSITIVITY_MAX
            {
                return Err(LexiconError::ScoreOutOfRange {
                    word,
                    score: entry.positivity,
                });
            }
            if exact.contains_key(&word) {
                log::warn!("Duplicate lexicon word '{word}'; keeping the first occurrence.");
                continue;
            }
            let idx = entries.len();
            // When several words share a stem, the first one in file order owns it.
            stemmed
                .entry(stemmer.stem(&word).into_owned())
                .or_insert(idx);
            exact.insert(word.clone(), idx);
            entries.push(LexiconEntry {
                word,
                positivity: entry.positivity,
                affect: entry.affect.filter(|a| !a.trim().is_empty()),
            });
        }

        if entries.is_empty() {
            return Err(LexiconError::Empty);
        }
        log::info!(
            "Lexicon ready: {} words, {} distinct stems.",
            entries.len(),
            stemmed.len()
        );
        Ok(Self {
            entries,
            exact,
            stemmed,
            stemmer,
        })
    }

    /// Loads a delimited lexicon with a `word,positivity[,affect]` header. Files ending in
    /// `.tsv` or `.txt` are read as tab separated.
    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some("tsv") | Some("txt") => b'\t',
            _ => b',',
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(File::open(path)?);
        let entries = reader
            .deserialize::<LexiconEntry>()
            .collect::<Result<Vec<_>, _>>()?;
        log::info!("Read {} lexicon rows from {}", entries.len(), path.display());
        Self::from_entries(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, token: &str) -> Option<&LexiconEntry> {
        if let Some(&idx) = self.exact.get(token) {
            return Some(&self.entries[idx]);
        }
        let stem = self.stemmer.stem(token);
        self.exact
            .get(stem.as_ref())
            .or_else(|| self.stemmed.get(stem.as_ref()))
            .map(|&idx| &self.entries[idx])
    }

    pub fn positivity(&self, token: &str) -> Option<f64> {
        self.entry(token).map(|e| e.positivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entry(word: &str, positivity: f64) -> LexiconEntry {
        LexiconEntry {
            word: word.to_string(),
            positivity,
            affect: None,
        }
    }

    #[test]
    fn exact_match_wins_over_stem() {
        let lexicon =
            Lexicon::from_entries(vec![entry("happy", 8.3), entry("happiness", 8.0)]).unwrap();
        assert_eq!(lexicon.positivity("happiness"), Some(8.0));
        assert_eq!(lexicon.positivity("happy"), Some(8.3));
    }

    #[test]
    fn stem_fallback_finds_inflected_forms() {
        let lexicon = Lexicon::from_entries(vec![entry("hospital", 3.0), entry("love", 8.4)])
            .unwrap();
        assert_eq!(lexicon.positivity("hospitals"), Some(3.0));
        assert_eq!(lexicon.positivity("loved"), Some(8.4));
        assert_eq!(lexicon.positivity("loving"), Some(8.4));
        assert_eq!(lexicon.positivity("zebra"), None);
    }

    #[test]
    fn duplicate_words_keep_first_entry() {
        let lexicon = Lexicon::from_entries(vec![entry("Sad", 2.0), entry("sad", 7.0)]).unwrap();
        assert_eq!(lexicon.len(), 1);
        assert_eq!(lexicon.positivity("sad"), Some(2.0));
    }

    #[test]
    fn empty_lexicon_is_fatal() {
        assert!(matches!(
            Lexicon::from_entries(Vec::new()),
            Err(LexiconError::Empty)
        ));
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        assert!(matches!(
            Lexicon::from_entries(vec![entry("great", 12.0)]),
            Err(LexiconError::ScoreOutOfRange { .. })
        ));
    }

    #[test]
    fn load_reads_tab_separated_file_with_affect() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "word\tpositivity\taffect").unwrap();
        writeln!(file, "joy\t8.2\tjoy").unwrap();
        writeln!(file, "fear\t2.1\t").unwrap();
        file.flush().unwrap();

        let lexicon = Lexicon::load(file.path()).unwrap();
        assert_eq!(lexicon.len(), 2);
        let joy = lexicon.entry("joy").unwrap();
        assert_eq!(joy.affect.as_deref(), Some("joy"));
        assert_eq!(lexicon.entry("fear").unwrap().affect, None);
    }

    #[test]
    fn load_missing_file_fails() {
        let result = Lexicon::load(Path::new("/definitely/not/here.csv"));
        assert!(matches!(result, Err(LexiconError::Io(_))));
    }
}
