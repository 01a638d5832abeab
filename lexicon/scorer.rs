use super::normalize::tokens;
use super::table::Lexicon;
use crate::types::{
    Coordinates, Document, ParseError, SentimentRecord, parse_coordinates, parse_timestamp,
};
use ahash::AHashMap;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Open interval of positivity scores treated as carrying no sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeutralBand {
    pub lower: f64,
    pub upper: f64,
}

impl Default for NeutralBand {
    fn default() -> Self {
        Self {
            lower: 4.0,
            upper: 6.0,
        }
    }
}

impl NeutralBand {
    #[inline]
    pub fn contains(&self, score: f64) -> bool {
        score > self.lower && score < self.upper
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub documents: usize,
    pub records: usize,
    /// Documents without a single informative token, or whose mean fell in the band.
    pub uninformative: usize,
    /// Documents dropped because a timestamp or coordinate field could not be parsed.
    pub malformed: usize,
}

/// Sum and count of informative token scores for one document.
#[derive(Debug, Clone, Copy, Default)]
struct TokenTally {
    sum: f64,
    count: usize,
}

impl TokenTally {
    fn absorb(&mut self, other: TokenTally) {
        self.sum += other.sum;
        self.count += other.count;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

struct ParsedDocument<'a> {
    doc: &'a Document,
    day: NaiveDate,
    coordinates: Option<Coordinates>,
    tally: TokenTally,
}

fn tally_tokens(text: &str, lexicon: &Lexicon, band: NeutralBand) -> TokenTally {
    let mut tally = TokenTally::default();
    for token in tokens(text) {
        if let Some(score) = lexicon.positivity(&token) {
            if !band.contains(score) {
                tally.sum += score;
                tally.count += 1;
            }
        }
    }
    tally
}

fn parse_document<'a>(
    doc: &'a Document,
    lexicon: &Lexicon,
    band: NeutralBand,
) -> Result<ParsedDocument<'a>, ParseError> {
    let day = parse_timestamp(&doc.timestamp)?;
    let coordinates = match doc.coordinates.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() && !raw.eq_ignore_ascii_case("na") => {
            Some(parse_coordinates(raw)?)
        }
        _ => None,
    };
    Ok(ParsedDocument {
        doc,
        day,
        coordinates,
        tally: tally_tokens(&doc.text, lexicon, band),
    })
}

fn finish_record(
    doc: &Document,
    day: NaiveDate,
    coordinates: Option<Coordinates>,
    tally: TokenTally,
    band: NeutralBand,
) -> Option<SentimentRecord> {
    let mean = tally.mean()?;
    if band.contains(mean) {
        return None;
    }
    Some(SentimentRecord {
        author_id: doc.author_id.clone(),
        document_id: doc.document_id.clone(),
        day,
        coordinates,
        mean_positivity: mean,
        informative_tokens: tally.count,
    })
}

/// Scores a single document. `Ok(None)` means the document carried no informative
/// tokens and must not be counted as neutral.
pub fn score_document(
    doc: &Document,
    lexicon: &Lexicon,
    band: NeutralBand,
) -> Result<Option<SentimentRecord>, ParseError> {
    let parsed = parse_document(doc, lexicon, band)?;
    Ok(finish_record(
        parsed.doc,
        parsed.day,
        parsed.coordinates,
        parsed.tally,
        band,
    ))
}

/// Scores a batch of documents. Rows sharing `(author, document, day, coordinates)` are
/// pooled before averaging, so a re-ingested post still yields a single record. Output
/// order follows first appearance in the input.
pub fn score(
    documents: &[Document],
    lexicon: &Lexicon,
    band: NeutralBand,
) -> (Vec<SentimentRecord>, ScoringSummary) {
    let parsed: Vec<Result<ParsedDocument<'_>, ParseError>> = documents
        .par_iter()
        .map(|doc| parse_document(doc, lexicon, band))
        .collect();

    let mut summary = ScoringSummary {
        documents: documents.len(),
        ..ScoringSummary::default()
    };
    let mut groups: Vec<ParsedDocument<'_>> = Vec::new();
    let mut index: AHashMap<(&str, &str, NaiveDate, Option<(u64, u64)>), usize> =
        AHashMap::new();

    for result in parsed {
        let p = match result {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Dropping malformed document: {e}");
                summary.malformed += 1;
                continue;
            }
        };
        let key = (
            p.doc.author_id.as_str(),
            p.doc.document_id.as_str(),
            p.day,
            p.coordinates.map(|c| c.key()),
        );
        match index.get(&key) {
            Some(&slot) => groups[slot].tally.absorb(p.tally),
            None => {
                index.insert(key, groups.len());
                groups.push(p);
            }
        }
    }

    let mut records = Vec::with_capacity(groups.len());
    for group in groups {
        match finish_record(group.doc, group.day, group.coordinates, group.tally, band) {
            Some(record) => records.push(record),
            None => summary.uninformative += 1,
        }
    }
    summary.records = records.len();

    log::info!(
        "Scored {} documents: {} sentiment records, {} uninformative, {} malformed.",
        summary.documents,
        summary.records,
        summary.uninformative,
        summary.malformed
    );
    (records, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::LexiconEntry;
    use approx::assert_abs_diff_eq;

    fn lexicon() -> Lexicon {
        let words = [
            ("awful", 2.0),
            ("wonderful", 8.0),
            ("terrible", 1.0),
            ("fantastic", 9.0),
            ("the", 5.0),
            ("hospital", 4.5),
            ("okay", 6.0),
            ("nurse", 7.5),
        ];
        Lexicon::from_entries(
            words
                .iter()
                .map(|(w, s)| LexiconEntry {
                    word: w.to_string(),
                    positivity: *s,
                    affect: None,
                })
                .collect(),
        )
        .unwrap()
    }

    fn doc(id: &str, timestamp: &str, text: &str, coords: Option<&str>) -> Document {
        Document {
            author_id: "a1".to_string(),
            document_id: id.to_string(),
            timestamp: timestamp.to_string(),
            text: text.to_string(),
            popularity_count: 0,
            coordinates: coords.map(str::to_string),
        }
    }

    #[test]
    fn neutral_band_is_open_interval() {
        let band = NeutralBand::default();
        assert!(!band.contains(4.0));
        assert!(band.contains(4.0001));
        assert!(band.contains(5.9999));
        assert!(!band.contains(6.0));
    }

    #[test]
    fn neutral_scores_are_excluded_from_the_mean() {
        let lex = lexicon();
        let record = score_document(
            &doc("d1", "2020-04-01", "the hospital was awful", None),
            &lex,
            NeutralBand::default(),
        )
        .unwrap()
        .unwrap();
        assert_abs_diff_eq!(record.mean_positivity, 2.0, epsilon = 1e-12);
        assert_eq!(record.informative_tokens, 1);
    }

    #[test]
    fn band_edges_are_informative() {
        let lex = lexicon();
        let record = score_document(
            &doc("d1", "2020-04-01", "okay terrible", None),
            &lex,
            NeutralBand::default(),
        )
        .unwrap()
        .unwrap();
        assert_abs_diff_eq!(record.mean_positivity, 3.5, epsilon = 1e-12);
    }

    #[test]
    fn documents_without_informative_tokens_yield_nothing() {
        let lex = lexicon();
        let band = NeutralBand::default();
        assert_eq!(
            score_document(&doc("d1", "2020-04-01", "the hospital", None), &lex, band).unwrap(),
            None
        );
        assert_eq!(
            score_document(&doc("d2", "2020-04-01", "zebras everywhere", None), &lex, band)
                .unwrap(),
            None
        );
    }

    #[test]
    fn document_mean_inside_band_is_uninformative() {
        let lex = lexicon();
        let result = score_document(
            &doc("d1", "2020-04-01", "awful but wonderful", None),
            &lex,
            NeutralBand::default(),
        )
        .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn stemmed_tokens_are_scored() {
        let lex = lexicon();
        let record = score_document(
            &doc("d1", "2020-04-01", "nurses at the hospitals", None),
            &lex,
            NeutralBand::default(),
        )
        .unwrap()
        .unwrap();
        // "hospitals" resolves through its stem onto a neutral word and is discarded.
        assert_abs_diff_eq!(record.mean_positivity, 7.5, epsilon = 1e-12);
        assert_eq!(record.informative_tokens, 1);
    }

    #[test]
    fn batch_scoring_drops_malformed_and_pools_duplicates() {
        let lex = lexicon();
        let docs = vec![
            doc("d1", "2020-04-01T10:00:00Z", "awful", Some("-73.9,40.7")),
            doc("d2", "not a time", "fantastic", None),
            doc("d3", "2020-04-01", "fantastic", Some("lat-long")),
            doc("d1", "2020-04-01T12:00:00Z", "terrible", Some("-73.9,40.7")),
            doc("d4", "2020-04-02", "the", None),
            doc("d5", "2020-04-02", "wonderful", None),
        ];
        let (records, summary) = score(&docs, &lex, NeutralBand::default());

        assert_eq!(summary.documents, 6);
        assert_eq!(summary.malformed, 2);
        assert_eq!(summary.uninformative, 1);
        assert_eq!(summary.records, 2);

        assert_eq!(records[0].document_id, "d1");
        assert_abs_diff_eq!(records[0].mean_positivity, 1.5, epsilon = 1e-12);
        assert_eq!(records[0].informative_tokens, 2);
        assert_eq!(
            records[0].coordinates,
            Some(Coordinates {
                lng: -73.9,
                lat: 40.7
            })
        );
        assert_eq!(records[1].document_id, "d5");
        assert_eq!(records[1].day, NaiveDate::from_ymd_opt(2020, 4, 2).unwrap());
    }
}
