//! # Lexicon Scorer
//!
//! Turns raw social-media documents into per-document positivity records. Text is
//! normalised, tokenised, and each token is looked up in a static word→positivity
//! table, falling back to the token's Snowball stem. Scores inside the neutral band
//! carry no sentiment signal and are discarded before aggregation.

pub mod normalize;
pub mod scorer;
pub mod table;

pub use scorer::{NeutralBand, ScoringSummary, score, score_document};
pub use table::{Lexicon, LexiconEntry, LexiconError};
pub use crate::types::ParseError;
