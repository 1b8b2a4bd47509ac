use riptide::aggregate::WarningKind;
use riptide::config::AggregatorConfig;
use riptide::events::EventKind;
use riptide::merge::ConflictSeverity;
use riptide::{ResultAggregator, TaskResult, WaveResult};

fn task(id: &str, files: &[&str]) -> TaskResult {
    TaskResult::success(id, "done")
        .with_files(files.iter().map(|f| f.to_string()).collect())
        .with_duration_ms(1000)
}

#[test]
fn duplicate_manifest_edit_is_one_critical_conflict() {
    let aggregator = ResultAggregator::new(AggregatorConfig::default());
    let wave = WaveResult::new(
        1,
        vec![
            task("t1", &["package.json"]),
            task("t2", &["package.json"]),
        ],
    );

    let aggregation = aggregator.aggregate(&wave);

    assert_eq!(aggregation.conflicts.len(), 1);
    let conflict = &aggregation.conflicts[0];
    assert_eq!(conflict.file, "package.json");
    assert_eq!(conflict.severity, ConflictSeverity::Critical);
    assert!(conflict.tasks.contains(&"t1".to_string()));
    assert!(conflict.tasks.contains(&"t2".to_string()));
}

#[test]
fn conflict_and_aggregation_events_are_emitted() {
    let aggregator = ResultAggregator::new(AggregatorConfig::default());
    let mut rx = aggregator.events().subscribe();

    aggregator.aggregate(&WaveResult::new(
        1,
        vec![task("t1", &["shared.js"]), task("t2", &["shared.js"])],
    ));

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == EventKind::ConflictsDetected)
            .count(),
        1
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == EventKind::AggregationComplete)
            .count(),
        1
    );
}

#[test]
fn three_tasks_on_one_file_is_still_one_conflict() {
    let aggregator = ResultAggregator::new(AggregatorConfig::default());
    let wave = WaveResult::new(
        1,
        vec![
            task("t1", &["shared.js"]),
            task("t2", &["shared.js"]),
            task("t3", &["shared.js"]),
        ],
    );

    let aggregation = aggregator.aggregate(&wave);
    assert_eq!(aggregation.conflicts.len(), 1);
    assert_eq!(aggregation.conflicts[0].tasks.len(), 3);
}

#[test]
fn failed_tasks_keep_their_outcome_in_the_aggregation() {
    let aggregator = ResultAggregator::new(AggregatorConfig::default());
    let wave = WaveResult::new(
        1,
        vec![
            task("t1", &["a.js"]),
            TaskResult::failure("t2", "exploded").with_duration_ms(100),
        ],
    );

    let aggregation = aggregator.aggregate(&wave);
    assert_eq!(aggregation.metrics.failed, 1);
    let failed = aggregation.tasks.iter().find(|t| !t.success).unwrap();
    assert_eq!(failed.error.as_deref(), Some("exploded"));
}

#[test]
fn warnings_do_not_depend_on_conflicts() {
    let aggregator = ResultAggregator::new(AggregatorConfig::default());
    let wave = WaveResult::new(1, vec![task("t1", &[])]);

    let aggregation = aggregator.aggregate(&wave);
    assert!(aggregation.conflicts.is_empty());
    assert!(aggregation
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::NoFilesModified));
}

#[test]
fn aggregate_all_folds_waves_into_one_view() {
    let aggregator = ResultAggregator::new(AggregatorConfig::default());
    let waves = vec![
        WaveResult::new(1, vec![task("t1", &["a.js"])]),
        WaveResult::new(
            2,
            vec![TaskResult::failure("t2", "fail").with_duration_ms(10)],
        ),
    ];

    let consolidated = aggregator.aggregate_all(&waves);

    assert_eq!(consolidated.total_waves, 2);
    assert_eq!(consolidated.all_tasks.len(), 2);
    assert_eq!(consolidated.overall_metrics.successful, 1);
    assert_eq!(consolidated.overall_metrics.failed, 1);
    assert_eq!(consolidated.overall_metrics.success_rate, 50.0);
}

#[test]
fn report_contains_every_outcome() {
    let tmp = tempfile::tempdir().unwrap();
    let aggregator = ResultAggregator::new(AggregatorConfig {
        report_dir: tmp.path().join("reports"),
        ..AggregatorConfig::default()
    });

    let wave = WaveResult::new(
        1,
        vec![
            task("t1", &["shared.js"]),
            TaskResult::failure("t2", "broke")
                .with_files(vec!["shared.js".to_string()])
                .with_duration_ms(5),
        ],
    );
    let aggregation = aggregator.aggregate(&wave);
    let path = aggregator.generate_report(&aggregation).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["tasks"].as_array().unwrap().len(), 2);
    assert_eq!(json["conflicts"].as_array().unwrap().len(), 1);

    let markdown = std::fs::read_to_string(path.with_extension("md")).unwrap();
    assert!(markdown.contains("Wave Results Report"));
    assert!(markdown.contains("shared.js"));
    assert!(markdown.contains("t2"));
}
