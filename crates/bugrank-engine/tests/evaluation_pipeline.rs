use bugrank_core::config::OptimizerConfig;
use bugrank_core::error::{DatasetError, EngineError};
use bugrank_core::types::{GroundTruth, ScoreMatrix, SourceFileIndex, WeightVector};
use bugrank_engine::artifact::{
    CsvRankingWriter, MemorySink, NullSink, RankingSink, StagedRankingFile,
};
use bugrank_engine::dataset::Dataset;
use bugrank_engine::evaluation::{self, EvaluationError};
use bugrank_engine::fusion::fuse;
use bugrank_engine::optimizer::{DifferentialEvolution, RandomSearch, build_optimizer};
use bugrank_engine::ranking::build_ranked_list;
use serde_json::json;
use std::path::Path;

fn optimizer_config(seed: u64, workers: usize) -> OptimizerConfig {
    OptimizerConfig {
        seed,
        max_iterations: 50,
        workers,
        ..OptimizerConfig::default()
    }
}

/// Files X, Y, Z; one report fixed by Y; the first signal ranks Y first,
/// the second ranks X first.
fn single_report_dataset() -> Dataset {
    let index = SourceFileIndex::new(["X", "Y", "Z"]).unwrap();
    let truth = GroundTruth::new(vec![("1".to_string(), vec!["Y"])], &index).unwrap();
    let signals = vec![
        ScoreMatrix::new("first", vec![("1".to_string(), vec![0.1, 0.9, 0.0])]).unwrap(),
        ScoreMatrix::new("second", vec![("1".to_string(), vec![0.9, 0.1, 0.0])]).unwrap(),
    ];
    Dataset::from_parts("xyz", index, truth, signals).unwrap()
}

#[test]
fn optimizer_finds_weights_that_rank_the_fix_first() {
    let dataset = single_report_dataset();
    let optimizer = DifferentialEvolution::from_config(&optimizer_config(458_711_526, 1));
    let mut sink = MemorySink::default();
    let (estimate, report) = evaluation::run(&dataset, &optimizer, &[1, 5, 10], &mut sink).unwrap();

    let weights = estimate.weights.as_slice();
    assert!(weights[0] > weights[1], "weights {weights:?}");
    assert!(estimate.outcome.converged);
    assert_eq!(report.metrics.mrr, 1.0);
    assert_eq!(report.metrics.map, 1.0);
    assert_eq!(report.metrics.top_n_hits, vec![1, 1, 1]);
    assert_eq!(report.per_report[0].fixed_ranks, vec![1]);
    assert_eq!(sink.rankings[0].0, "1");
    assert_eq!(sink.rankings[0].1[0], "Y");
    assert_eq!(report.optimization.as_ref().map(|o| o.converged), Some(true));
}

#[test]
fn random_search_also_solves_the_toy_problem() {
    let dataset = single_report_dataset();
    let optimizer = RandomSearch::new(5, 20, 2);
    let estimate = evaluation::estimate(&dataset, &optimizer).unwrap();
    assert_eq!(estimate.outcome.cost, -2.0);
    assert!(estimate.outcome.converged);
}

#[test]
fn estimation_is_reproducible_across_runs_and_worker_counts() {
    let index = SourceFileIndex::new(["A", "B", "C", "D", "E"]).unwrap();
    let truth = GroundTruth::new(
        vec![
            ("1".to_string(), vec!["B"]),
            ("2".to_string(), vec!["E", "A"]),
            ("3".to_string(), vec!["C"]),
        ],
        &index,
    )
    .unwrap();
    let signals = vec![
        ScoreMatrix::new(
            "a",
            vec![
                ("1".to_string(), vec![0.3, 0.6, 0.1, 0.9, 0.0]),
                ("2".to_string(), vec![0.2, 0.7, 0.1, 0.4, 0.5]),
                ("3".to_string(), vec![0.5, 0.1, 0.4, 0.3, 0.2]),
            ],
        )
        .unwrap(),
        ScoreMatrix::new(
            "b",
            vec![
                ("1".to_string(), vec![0.0, 0.5, 0.2, 0.1, 0.8]),
                ("2".to_string(), vec![0.6, 0.0, 0.3, 0.2, 0.1]),
                ("3".to_string(), vec![0.1, 0.2, 0.9, 0.8, 0.3]),
            ],
        )
        .unwrap(),
        ScoreMatrix::new(
            "c",
            vec![
                ("1".to_string(), vec![0.4, 0.4, 0.4, 0.4, 0.4]),
                ("2".to_string(), vec![0.0, 0.0, 0.0, 0.0, 1.0]),
                ("3".to_string(), vec![0.2, 0.9, 0.1, 0.0, 0.0]),
            ],
        )
        .unwrap(),
    ];
    let dataset = Dataset::from_parts("five", index, truth, signals).unwrap();

    let serial = evaluation::estimate(
        &dataset,
        &DifferentialEvolution::from_config(&optimizer_config(99, 1)),
    )
    .unwrap();
    let repeat = evaluation::estimate(
        &dataset,
        &DifferentialEvolution::from_config(&optimizer_config(99, 1)),
    )
    .unwrap();
    let parallel = evaluation::estimate(
        &dataset,
        &DifferentialEvolution::from_config(&optimizer_config(99, 4)),
    )
    .unwrap();
    assert_eq!(serial, repeat);
    assert_eq!(serial, parallel);
    for weight in serial.weights.as_slice() {
        assert!((0.0..=1.0).contains(weight));
    }
}

#[test]
fn fusion_and_ranking_are_idempotent() {
    let dataset = single_report_dataset();
    let weights = WeightVector::new(vec![0.3, 0.7]).unwrap();
    let first = fuse(dataset.signals(), &weights, dataset.index()).unwrap();
    let second = fuse(dataset.signals(), &weights, dataset.index()).unwrap();
    assert_eq!(first, second);
    let row = first.row("1").unwrap();
    assert_eq!(
        build_ranked_list(row, dataset.index()).unwrap(),
        build_ranked_list(second.row("1").unwrap(), dataset.index()).unwrap()
    );

    let mut a = MemorySink::default();
    let mut b = MemorySink::default();
    evaluation::evaluate(&dataset, &weights, &[1], &mut a).unwrap();
    evaluation::evaluate(&dataset, &weights, &[1], &mut b).unwrap();
    assert_eq!(a, b);
}

/// Weights are fitted on the very reports they are scored on: a run's
/// metrics equal a separate evaluation of its weights on the same data.
#[test]
fn run_scores_the_reports_it_was_fitted_on() {
    let dataset = single_report_dataset();
    let config = optimizer_config(1, 1);
    let optimizer = build_optimizer(&config);
    let (estimate, run_report) =
        evaluation::run(&dataset, optimizer.as_ref(), &[1], &mut NullSink).unwrap();
    let replay = evaluation::evaluate(&dataset, &estimate.weights, &[1], &mut NullSink).unwrap();
    assert_eq!(run_report.metrics, replay.metrics);
    assert_eq!(run_report.per_report, replay.per_report);
    assert_eq!(
        run_report.optimization.as_ref().map(|o| o.cost),
        Some(-(replay.metrics.mrr + replay.metrics.map))
    );
}

#[test]
fn degenerate_reports_are_still_processed() {
    let index = SourceFileIndex::new(["A", "B", "C"]).unwrap();
    let truth = GroundTruth::new(
        vec![("1".to_string(), vec!["C"]), ("2".to_string(), vec!["B"])],
        &index,
    )
    .unwrap();
    let signals = vec![
        ScoreMatrix::new(
            "flat",
            vec![
                ("1".to_string(), vec![0.0, 0.0, 0.0]),
                ("2".to_string(), vec![0.0, 0.0, 0.0]),
            ],
        )
        .unwrap(),
    ];
    let dataset = Dataset::from_parts("flat", index, truth, signals).unwrap();
    let weights = WeightVector::new(vec![1.0]).unwrap();
    let mut sink = MemorySink::default();
    let report = evaluation::evaluate(&dataset, &weights, &[1, 5], &mut sink).unwrap();

    assert_eq!(sink.rankings.len(), 2);
    for (_, files) in &sink.rankings {
        assert_eq!(files, &["A", "B", "C"]);
    }
    assert_eq!(report.per_report[0].fixed_ranks, vec![3]);
    assert_eq!(report.per_report[1].fixed_ranks, vec![2]);
    assert_eq!(report.metrics.top_n_hits, vec![0, 2]);
}

fn write(dir: &Path, name: &str, value: serde_json::Value) {
    std::fs::write(dir.join(name), value.to_string()).unwrap();
}

#[test]
fn on_disk_dataset_to_ranking_listing() {
    let temp = tempfile::tempdir().unwrap();
    write(
        temp.path(),
        "dataset.json",
        json!({
            "version": "bugrank-dataset-v1",
            "name": "disk",
            "source_files": ["src\\A.java", "./src/B.java", "src/C.java"],
            "reports": [
                {"bug_id": "42", "fixed_files": ["src/B.java"]},
                {"bug_id": "7", "fixed_files": ["src/A.java", "src\\C.java"]}
            ],
            "signals": [{"name": "raw", "normalize": true}]
        }),
    );
    write(temp.path(), "raw.json", json!([[1.0, 5.0, 3.0], [10.0, 2.0, 6.0]]));

    let dataset = Dataset::load(&temp.path().join("dataset.json")).unwrap();
    let output = temp.path().join("output.csv");
    let mut sink = CsvRankingWriter::create(&output).unwrap();
    let weights = WeightVector::new(vec![1.0]).unwrap();
    let report = evaluation::evaluate(&dataset, &weights, &[1, 5, 10], &mut sink).unwrap();
    sink.finish().unwrap();
    drop(sink);

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "42,src/B.java,src/C.java,src/A.java\n7,src/A.java,src/C.java,src/B.java\n"
    );
    assert_eq!(report.metrics.mrr, 1.0);
    assert_eq!(report.metrics.map, 1.0);
    assert_eq!(report.dataset, "disk");
    assert_eq!(report.fingerprint, dataset.fingerprint());
    // two fixed files in the top 5 of a three-file index
    assert!((report.per_report[1].precision_at_n[1] - 2.0 / 5.0).abs() < 1e-12);
    assert_eq!(report.per_report[1].recall_at_n[1], 1.0);
}

#[test]
fn loader_surfaces_missing_ground_truth_file() {
    let temp = tempfile::tempdir().unwrap();
    write(
        temp.path(),
        "dataset.json",
        json!({
            "version": "bugrank-dataset-v1",
            "name": "broken",
            "source_files": ["A", "B"],
            "reports": [{"bug_id": "9", "fixed_files": ["Missing.java"]}],
            "signals": [{"name": "s"}]
        }),
    );
    write(temp.path(), "s.json", json!([[0.5, 0.5]]));
    match Dataset::load(&temp.path().join("dataset.json")) {
        Err(DatasetError::Engine(EngineError::MissingGroundTruthFile { bug_id, file })) => {
            assert_eq!(bug_id, "9");
            assert_eq!(file, "Missing.java");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn evaluation_rejects_weights_for_other_signal_count() {
    let dataset = single_report_dataset();
    let weights = WeightVector::new(vec![1.0, 0.0, 0.0]).unwrap();
    let err = evaluation::evaluate(&dataset, &weights, &[1], &mut NullSink).unwrap_err();
    assert!(matches!(
        err,
        EvaluationError::Engine(EngineError::WeightCountMismatch { expected: 2, actual: 3 })
    ));
}

#[test]
fn failed_evaluation_leaves_no_ranking_listing() {
    let dataset = single_report_dataset();
    let temp = tempfile::tempdir().unwrap();
    let output = temp.path().join("output.csv");

    let weights = WeightVector::new(vec![1.0]).unwrap();
    let mut sink = StagedRankingFile::create(&output).unwrap();
    assert!(evaluation::evaluate(&dataset, &weights, &[1], &mut sink).is_err());
    drop(sink);
    assert!(!output.exists());
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);

    let weights = WeightVector::new(vec![1.0, 0.0]).unwrap();
    let mut sink = StagedRankingFile::create(&output).unwrap();
    evaluation::evaluate(&dataset, &weights, &[1], &mut sink).unwrap();
    sink.commit().unwrap();
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "1,Y,X,Z\n");
}
