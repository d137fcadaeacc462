//! Integration tests for the store-to-plot analysis pipeline.

use cellcount_analysis::pipeline::DEFAULT_CELL_TYPES;
use cellcount_analysis::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::{tempdir, NamedTempFile};

const HEADER: &str = "project,subject,condition,age,sex,treatment,response,sample,sample_type,time_from_treatment_start,b_cell,cd8_t_cell,cd4_t_cell,nk_cell,monocyte";

/// Synthetic study: 16 cohort samples in a balanced response × time design
/// (4 replicates per cell) plus samples outside the cohort.
fn synthetic_csv() -> String {
    let mut rng_seed = 7u64;
    let mut simple_rand = move || -> f64 {
        rng_seed = rng_seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((rng_seed >> 16) & 0x7FFF) as f64 / 32768.0
    };

    let mut lines = vec![HEADER.to_string()];
    for i in 0..16 {
        let responder = i % 2 == 0;
        let time = if (i / 2) % 2 == 0 { 0 } else { 7 };
        let b_effect = if responder { 2.0 } else { 1.0 };
        let counts: Vec<u64> = [1000.0 * b_effect, 2500.0, 3000.0, 1500.0, 2000.0]
            .iter()
            .map(|base| (base * (0.8 + 0.4 * simple_rand())).round() as u64)
            .collect();
        lines.push(format!(
            "prj1,sbj{},melanoma,{},{},miraclib,{},s{},PBMC,{},{},{},{},{},{}",
            i / 2,
            40 + i,
            if i % 3 == 0 { "F" } else { "M" },
            if responder { "yes" } else { "no" },
            i,
            time,
            counts[0],
            counts[1],
            counts[2],
            counts[3],
            counts[4]
        ));
    }
    lines.push("prj2,sbx1,carcinoma,55,F,miraclib,yes,x1,PBMC,0,9000,100,100,100,100".to_string());
    lines.push("prj2,sbx2,melanoma,60,M,phauximab,no,x2,PBMC,7,100,9000,100,100,100".to_string());
    lines.push("prj3,sbx3,melanoma,49,M,miraclib,no,x3,WB,0,100,100,9000,100,100".to_string());
    lines.push("prj3,sbx4,healthy,38,F,none,,x4,PBMC,0,100,100,100,9000,100".to_string());
    lines.join("\n") + "\n"
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

fn init_store(db: &Path) -> SqliteSampleStore {
    let csv = write_temp(&synthetic_csv());
    let mut store = SqliteSampleStore::open(db).unwrap();
    assert_eq!(store.create_from_csv(csv.path()).unwrap(), 20);
    store
}

#[test]
fn test_frequencies_from_store() {
    let dir = tempdir().unwrap();
    let store = init_store(&dir.path().join("cell_counts.db"));
    let samples = store.read_all().unwrap();
    let config = AnalysisConfig::default();

    let freq = compute_frequencies(&samples, &config.cell_type_columns).unwrap();
    assert_eq!(freq.len(), 20 * 5);

    let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
    for r in freq.iter() {
        assert!(r.count <= r.total_count);
        assert!((0.0..=100.0).contains(&r.relative_frequency));
        *sums.entry(r.sample.as_str()).or_default() += r.relative_frequency;
    }
    for (sample, total) in sums {
        assert!((total - 100.0).abs() <= 0.1, "{} sums to {}", sample, total);
    }

    let again = compute_frequencies(&samples, &config.cell_type_columns).unwrap();
    assert_eq!(freq, again);
}

#[test]
fn test_balanced_anova_emits_three_terms_per_cell_type() {
    let dir = tempdir().unwrap();
    let store = init_store(&dir.path().join("cell_counts.db"));
    let context = Pipeline::full(AnalysisConfig::default())
        .run(store.read_all().unwrap())
        .unwrap();
    let results = context.results().unwrap();

    for cell_type in DEFAULT_CELL_TYPES {
        let terms: Vec<&str> = results
            .iter()
            .filter(|r| r.cell_type == cell_type)
            .map(|r| r.term.as_str())
            .collect();
        assert_eq!(
            terms,
            vec![
                "response",
                "time_from_treatment_start",
                "response:time_from_treatment_start"
            ],
            "terms for {}",
            cell_type
        );
    }
    assert!(results.iter().all(|r| r.p_value.is_finite()));

    let b_cell = results
        .iter()
        .find(|r| r.cell_type == "b_cell" && r.term == "response")
        .unwrap();
    assert!(b_cell.significance.is_significant());

    let plot = context.plot().unwrap();
    assert_eq!(plot.panels.len(), 5);
    assert_eq!(plot.nrows, 2);
    assert_eq!(plot.height, 600);
    assert!(plot.panels[0].title.starts_with("b_cell (p="));
}

#[test]
fn test_samples_outside_cohort_never_reach_results() {
    let samples = SampleTable::from_csv_reader(synthetic_csv().as_bytes()).unwrap();
    let config = AnalysisConfig::default();
    let context = Pipeline::new(config.clone())
        .frequencies()
        .statistics()
        .run(samples)
        .unwrap();
    let analysis = context.analysis().unwrap();
    assert_eq!(analysis.len(), 16 * 5);
    assert!(analysis.records.iter().all(|r| r.sample.starts_with('s')));

    // changing counts outside the cohort leaves the statistics untouched
    let altered = synthetic_csv().replace(",x1,PBMC,0,9000,", ",x1,PBMC,0,1,");
    let context2 = Pipeline::new(config)
        .frequencies()
        .statistics()
        .run(SampleTable::from_csv_reader(altered.as_bytes()).unwrap())
        .unwrap();
    let p1: Vec<f64> = context.results().unwrap().iter().map(|r| r.p_value).collect();
    let p2: Vec<f64> = context2.results().unwrap().iter().map(|r| r.p_value).collect();
    assert_eq!(p1, p2);
}

#[test]
fn test_rank_test_on_separated_groups() {
    let csv = "\
sample,condition,sample_type,treatment,response,b_cell,monocyte
r1,melanoma,PBMC,miraclib,yes,10,90
r2,melanoma,PBMC,miraclib,yes,20,80
r3,melanoma,PBMC,miraclib,yes,30,70
n1,melanoma,PBMC,miraclib,no,40,60
n2,melanoma,PBMC,miraclib,no,50,50
n3,melanoma,PBMC,miraclib,no,60,40
";
    let samples = SampleTable::from_csv_reader(csv.as_bytes()).unwrap();
    let cols = vec!["b_cell".to_string(), "monocyte".to_string()];
    let freq = compute_frequencies(&samples, &cols).unwrap();
    let results = compare_groups(
        &freq,
        &samples,
        &cols,
        &CohortFilter::default(),
        &StatStrategy::rank_test(),
    )
    .unwrap();

    let pvalues = cell_type_pvalues(&results, "response").unwrap();
    assert!(pvalues["b_cell"] < 0.1);

    // identical distributions
    let same = csv.replace("n1,melanoma,PBMC,miraclib,no,40,60", "n1,melanoma,PBMC,miraclib,no,10,90")
        .replace("n2,melanoma,PBMC,miraclib,no,50,50", "n2,melanoma,PBMC,miraclib,no,20,80")
        .replace("n3,melanoma,PBMC,miraclib,no,60,40", "n3,melanoma,PBMC,miraclib,no,30,70");
    let samples = SampleTable::from_csv_reader(same.as_bytes()).unwrap();
    let freq = compute_frequencies(&samples, &cols).unwrap();
    let results = compare_groups(
        &freq,
        &samples,
        &cols,
        &CohortFilter::default(),
        &StatStrategy::rank_test(),
    )
    .unwrap();
    let pvalues = cell_type_pvalues(&results, "response").unwrap();
    assert!((pvalues["b_cell"] - 1.0).abs() < 1e-9);
}

#[test]
fn test_zero_total_sample_fails() {
    let csv = "sample,b_cell,nk_cell\ns1,0,0\ns2,1,3\n";
    let samples = SampleTable::from_csv_reader(csv.as_bytes()).unwrap();
    let cols = vec!["b_cell".to_string(), "nk_cell".to_string()];
    assert!(matches!(
        compute_frequencies(&samples, &cols),
        Err(CellCountError::DivisionByZero { sample }) if sample == "s1"
    ));
}

#[test]
fn test_add_and_remove_samples() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cell_counts.db");
    init_store(&db);

    // reopen, as each CLI command does
    let mut store = SqliteSampleStore::open(&db).unwrap();
    let extra = write_temp(&format!(
        "{}\nprj4,sbj99,melanoma,51,M,miraclib,yes,s99,PBMC,14,10,20,30,20,20\n",
        HEADER
    ));
    assert_eq!(store.append_csv(extra.path()).unwrap(), 1);
    assert_eq!(store.read_all().unwrap().n_rows(), 21);

    let before = store.read_all().unwrap();
    assert_eq!(store.delete_by_sample_id(&["nope".to_string()]).unwrap(), 0);
    assert_eq!(store.read_all().unwrap(), before);

    assert_eq!(store.delete_by_sample_id(&["s99".to_string()]).unwrap(), 1);
    assert_eq!(store.read_all().unwrap().n_rows(), 20);
    assert_eq!(store.list_columns().unwrap().len(), 15);
}

#[test]
fn test_query_and_grouped_counts() {
    let samples = SampleTable::from_csv_reader(synthetic_csv().as_bytes()).unwrap();
    let subset = SubsetQuery::new()
        .with("condition", &["melanoma"])
        .with("sample_type", &["PBMC"])
        .apply(&samples)
        .unwrap();
    assert_eq!(subset.n_rows(), 17);

    let group = vec!["treatment".to_string(), "response".to_string()];
    let count = vec!["sample".to_string()];
    let grouped = grouped_counts(&subset, &group, &count).unwrap();
    let total: usize = grouped.groups.iter().map(|g| g.counts[0]).sum();
    assert_eq!(total, 17);

    let overlapping = vec!["response".to_string(), "b_cell".to_string()];
    assert!(matches!(
        grouped_counts(&subset, &group, &overlapping),
        Err(CellCountError::OverlappingColumns(cols)) if cols == vec!["response".to_string()]
    ));
}

#[test]
fn test_config_file_and_exports() {
    let yaml = "\
name: rank_comparison
cell_type_columns: [b_cell, cd8_t_cell, cd4_t_cell, nk_cell, monocyte]
cohort:
  predicates:
    - column: condition
      value: melanoma
    - column: sample_type
      value: PBMC
strategy:
  kind: rank_test
";
    let config_file = write_temp(yaml);
    let config = AnalysisConfig::from_file(config_file.path()).unwrap();
    assert_eq!(config.strategy, StatStrategy::rank_test());
    assert_eq!(config.cohort.predicates.len(), 2);

    let samples = SampleTable::from_csv_reader(synthetic_csv().as_bytes()).unwrap();
    let context = Pipeline::full(config).run(samples).unwrap();

    let dir = tempdir().unwrap();
    let freq_path = dir.path().join("frequencies.tsv");
    let stats_path = dir.path().join("statistics.tsv");
    let plot_path = dir.path().join("plot.json");
    context.frequencies().unwrap().to_tsv(&freq_path).unwrap();
    context.results().unwrap().to_tsv(&stats_path).unwrap();
    context.plot().unwrap().to_json_file(&plot_path).unwrap();

    let freq_lines = std::fs::read_to_string(&freq_path).unwrap().lines().count();
    assert_eq!(freq_lines, 1 + 20 * 5);
    let stats = std::fs::read_to_string(&stats_path).unwrap();
    assert_eq!(stats.lines().count(), 1 + 5);
    assert!(stats.lines().skip(1).all(|l| l.contains("\tmann_whitney_u\t")));

    let plot: PanelGrid = serde_json::from_str(&std::fs::read_to_string(&plot_path).unwrap()).unwrap();
    assert_eq!(plot.panels.len(), 5);
    // x2 is phauximab but this cohort does not restrict treatment
    assert!(plot.panels.iter().all(|p| p.groups.len() == 2));
}
