use augur::config::RunConfig;
use augur::dependence::estimate;
use augur::forecast::ForecastError;
use augur::lexicon::{Lexicon, LexiconEntry};
use augur::orchestrator::{Collaborators, PipelineError, analyse, prepare_series, run_locations};
use augur::report::DirectoryReportSink;
use augur::series::AlignedPair;
use augur::sources::{CsvDocumentSource, CsvEpiSource, SourceError, StaticGazetteer};
use augur::types::{Document, EpiObservation};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 4, d).unwrap()
}

fn word_lexicon() -> Lexicon {
    Lexicon::from_entries(word_entries()).unwrap()
}

fn word_entries() -> Vec<LexiconEntry> {
    [
        ("awful", 1.0),
        ("sad", 2.0),
        ("tired", 3.0),
        ("calm", 7.0),
        ("happy", 8.0),
        ("great", 9.0),
    ]
    .into_iter()
    .map(|(word, positivity)| LexiconEntry {
        word: word.to_string(),
        positivity,
        affect: None,
    })
    .collect()
}

#[test]
fn three_day_scenario_excludes_neutral_day_and_aligns_dependencies() {
    let lexicon = word_lexicon();
    let post = |id: &str, timestamp: &str, text: &str| Document {
        author_id: format!("author-{id}"),
        document_id: id.to_string(),
        timestamp: timestamp.to_string(),
        text: text.to_string(),
        popularity_count: 0,
        coordinates: None,
    };
    // Day one scores 2 and 8 in the same post: the mean of 5 sits inside the neutral band.
    let documents = vec![
        post("t1", "2020-04-01T09:00:00Z", "sad but happy"),
        post("t2", "2020-04-02T10:00:00Z", "awful"),
        post("t3", "2020-04-03T10:00:00Z", "great"),
    ];

    let epi: Vec<EpiObservation> = [50.0, 55.0, 54.0]
        .into_iter()
        .enumerate()
        .map(|(i, cumulative)| EpiObservation {
            date: day(i as u32 + 1),
            new_cases: Some(10.0 + i as f64),
            cumulative_hospitalizations: Some(cumulative),
        })
        .collect();

    let config = RunConfig::default();
    let prepared = prepare_series(&config, &lexicon, &documents, &epi);

    let days: Vec<NaiveDate> = prepared.records.iter().map(|r| r.day).collect();
    assert_eq!(days, vec![day(2), day(3)]);
    assert_eq!(prepared.records[0].mean_positivity, 1.0);
    assert_eq!(prepared.records[1].mean_positivity, 9.0);
    assert_eq!(prepared.scoring.uninformative, 1);

    assert_eq!(
        prepared.epi.hospitalizations.values(),
        &[None, Some(5.0), Some(-1.0)]
    );

    let aligned = AlignedPair::new(&prepared.positivity, &prepared.epi.hospitalizations).unwrap();
    let overlap: Vec<NaiveDate> = aligned
        .complete_cases()
        .into_iter()
        .map(|(d, _, _)| d)
        .collect();
    assert_eq!(overlap, vec![day(2), day(3)]);

    // Two paired days are too few for the kernel estimators.
    assert!(estimate(&prepared.positivity, &prepared.epi.hospitalizations, 1, 0.5).is_err());

    let err = analyse(
        &RunConfig {
            training_cutoff_date: day(3),
            ..RunConfig::default()
        },
        &lexicon,
        &documents,
        &epi,
        Err(SourceError::UnknownLocation("nowhere".into())),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Forecast {
            source: ForecastError::InsufficientData { .. },
            ..
        }
    ));
}

const WORDS: [&str; 6] = ["awful", "sad", "tired", "calm", "happy", "great"];
const DAYS: i64 = 40;

fn write_inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf, std::path::PathBuf) {
    let mut rng = StdRng::seed_from_u64(7);
    let start = day(1);

    let mut documents =
        String::from("author_id,document_id,timestamp,text,popularity_count,coordinates\n");
    for offset in 0..DAYS {
        let date = start + Duration::days(offset);
        for post in 0..3 {
            let mood = ((offset as f64 / 5.0).sin() * 2.5 + 2.5 + rng.gen_range(-0.5..0.5))
                .round()
                .clamp(0.0, 5.0) as usize;
            let lng = rng.gen_range(-74.2..-73.75);
            let lat = rng.gen_range(40.5..40.9);
            writeln!(
                documents,
                "u{post},d{offset}-{post},{date}T1{post}:00:00Z,feeling {} today,{},\"{lng:.6},{lat:.6}\"",
                WORDS[mood],
                rng.gen_range(0..50)
            )
            .unwrap();
        }
    }

    let mut epi = String::from("date,new_cases,cumulative_hospitalizations\n");
    let mut cumulative = 100.0;
    for offset in 0..DAYS {
        let date = start + Duration::days(offset);
        let cases = 200.0 + 3.0 * offset as f64 + 20.0 * (offset as f64 / 4.0).sin()
            + rng.gen_range(-5.0..5.0);
        cumulative += 8.0 + 3.0 * (offset as f64 / 6.0).cos() + rng.gen_range(0.0..2.0);
        writeln!(epi, "{date},{cases:.1},{cumulative:.1}").unwrap();
    }

    let mut lexicon = String::from("word,positivity\n");
    for (word, score) in WORDS.iter().zip([1.0, 2.0, 3.0, 7.0, 8.0, 9.0]) {
        writeln!(lexicon, "{word},{score}").unwrap();
    }

    let paths = (
        dir.join("documents.csv"),
        dir.join("epi.csv"),
        dir.join("lexicon.csv"),
    );
    fs::write(&paths.0, documents).unwrap();
    fs::write(&paths.1, epi).unwrap();
    fs::write(&paths.2, lexicon).unwrap();
    paths
}

#[test]
fn full_run_writes_a_report_per_location() {
    let inputs = tempdir().unwrap();
    let (documents_path, epi_path, lexicon_path) = write_inputs(inputs.path());
    let output = tempdir().unwrap();

    let lexicon = Lexicon::load(&lexicon_path).unwrap();
    let documents = CsvDocumentSource::new(&documents_path);
    let epi = CsvEpiSource::new(&epi_path);
    let gazetteer = StaticGazetteer::builtin();
    let sink = DirectoryReportSink::new(output.path());
    let collaborators = Collaborators {
        documents: &documents,
        epi: &epi,
        gazetteer: &gazetteer,
    };

    let base = RunConfig {
        training_cutoff_date: day(30),
        forecast_horizon: 7,
        max_lag: 5,
        grid_sample_count: 200,
        ..RunConfig::default()
    };
    let configs = vec![
        base.clone(),
        RunConfig {
            location_name: "Atlantis".to_string(),
            ..base.clone()
        },
    ];

    let results = run_locations(&configs, &lexicon, collaborators, &sink);
    assert_eq!(results.len(), 2);

    let (name, new_york) = &results[0];
    assert_eq!(name, "New York");
    let report = new_york.as_ref().unwrap();
    assert_eq!(report.scoring.documents, 3 * DAYS as usize);
    assert!(report.dependency_cases.is_computed());
    assert!(report.dependency_hospitalizations.is_computed());
    assert!(report.sentiment_field.is_computed());
    let field = report.sentiment_field.computed().unwrap();
    assert_eq!(field.points.len(), 200);
    assert!(field.variances.iter().all(|v| *v >= 0.0));
    let outcome_field = report
        .outcome_field
        .computed()
        .expect("hospitalization field with sentiment drift");
    assert!(outcome_field.external_drift);
    assert_eq!(outcome_field.points, field.points);
    assert!(outcome_field.predictions.iter().all(|v| v.is_finite()));

    let first_forecast_day = day(30) + Duration::days(1);
    for forecast in [
        &report.predictor_forecast.points,
        &report.cases_forecast.points,
        &report.hospitalizations_forecast.points,
    ] {
        assert_eq!(forecast.len(), 7);
        assert_eq!(forecast[0].date, first_forecast_day);
        for point in forecast {
            assert!(point.lower_95 <= point.lower_80);
            assert!(point.lower_80 <= point.point_estimate);
            assert!(point.point_estimate <= point.upper_80);
            assert!(point.upper_80 <= point.upper_95);
        }
    }
    assert!(report.predictor_forecast.training_end <= day(30));

    let dir = output.path().join("new_york");
    for file in [
        "summary.toml",
        "series.csv",
        "forecasts.csv",
        "sentiment_field.csv",
        "outcome_field.csv",
    ] {
        assert!(dir.join(file).exists(), "{file} should be written");
    }
    let forecasts = fs::read_to_string(dir.join("forecasts.csv")).unwrap();
    assert_eq!(forecasts.lines().count(), 1 + 3 * 7);
    let series = fs::read_to_string(dir.join("series.csv")).unwrap();
    assert_eq!(series.lines().count(), 1 + DAYS as usize);
    let summary = fs::read_to_string(dir.join("summary.toml")).unwrap();
    assert!(summary.contains("aicc-grid"));

    // No bounding box for Atlantis: the run still completes, without spatial fields.
    let (name, atlantis) = &results[1];
    assert_eq!(name, "Atlantis");
    let report = atlantis.as_ref().unwrap();
    assert!(!report.sentiment_field.is_computed());
    assert!(!report.outcome_field.is_computed());
    assert!(!output.path().join("atlantis").join("sentiment_field.csv").exists());
}

#[test]
fn saved_configuration_drives_an_identical_run() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let config = RunConfig {
        location_name: "Chicago".to_string(),
        seed: 1234,
        ..RunConfig::default()
    };
    config.save(&path).unwrap();
    assert_eq!(RunConfig::load(&path).unwrap(), config);
}
