mod common;

use common::{TestWorkspace, single_column_csv};
use dataset_ingest::{
    config::IngestConfig,
    dataset::ColumnData,
    pipeline::{DatasetLoader, SidecarState},
    reader::{ReadOptions, SourceFormat},
    schema::{SchemaStore, SemanticType, SidecarFileStore},
};

fn loader() -> DatasetLoader {
    DatasetLoader::new(IngestConfig::default())
}

fn text_column(data: &ColumnData) -> Vec<Option<String>> {
    (0..data.len()).map(|row| data.cell_text(row)).collect()
}

#[test]
fn id_and_status_scenario() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("visits.csv", "id,status\n1,Y\n2,N\n3,Y\n");
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();

    assert_eq!(loaded.types["id"], SemanticType::Numeric);
    assert_eq!(loaded.types["status"], SemanticType::Binary);
    assert_eq!(
        loaded.dataset.column("status").unwrap().data,
        ColumnData::Integer(vec![Some(1), Some(0), Some(1)])
    );
    assert_eq!(loaded.sidecar_state, SidecarState::Seeded);
    let sidecar = workspace.sidecar(&path).expect("sidecar written");
    assert!(sidecar.contains("status: binary"));
}

#[test]
fn grade_scenario_is_categorical() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("grades.csv", &single_column_csv("grade", &["A", "B", "C", "A", "B"]));
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();

    assert_eq!(loaded.types["grade"], SemanticType::Categorical);
    match &loaded.dataset.column("grade").unwrap().data {
        ColumnData::Categorical(categories) => {
            assert_eq!(categories.levels, vec!["A", "B", "C"]);
            assert!(!categories.ordered);
        }
        other => panic!("expected categories, got {other:?}"),
    }
}

#[test]
fn level_scenario_is_ordinal_in_vocabulary_order() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "levels.csv",
        &single_column_csv("level", &["Low", "High", "Medium", "Low"]),
    );
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();

    assert_eq!(loaded.types["level"], SemanticType::Ordinal);
    assert_eq!(loaded.orders["level"], vec!["Low", "Medium", "High"]);
    match &loaded.dataset.column("level").unwrap().data {
        ColumnData::Categorical(categories) => {
            assert!(categories.ordered);
            assert_eq!(categories.codes, vec![Some(0), Some(2), Some(1), Some(0)]);
        }
        other => panic!("expected ordered categories, got {other:?}"),
    }
}

#[test]
fn loading_twice_gives_the_same_table() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "survey.csv",
        "id,level,score,visited\n1,Low,3.5,2024-01-15\n2,High,4.0,2024-02-20\n3,Medium,2.5,2024-03-25\n",
    );
    let loader = loader();
    let first = loader.load(&path, &ReadOptions::default()).unwrap();
    let second = loader.load(&path, &ReadOptions::default()).unwrap();

    assert_eq!(first.sidecar_state, SidecarState::Seeded);
    assert_eq!(second.sidecar_state, SidecarState::Present);
    assert_eq!(first.types, second.types);
    assert_eq!(first.orders, second.orders);
    assert_eq!(first.dataset, second.dataset);
}

#[test]
fn overrides_survive_reloads() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("scores.csv", "score\n1\n2\n3\n4\n5\n");
    let loader = loader();
    assert_eq!(
        loader.load(&path, &ReadOptions::default()).unwrap().types["score"],
        SemanticType::Numeric
    );

    loader
        .set_column_type(&path, "score", SemanticType::Categorical, None)
        .unwrap();
    for _ in 0..2 {
        let loaded = loader.load(&path, &ReadOptions::default()).unwrap();
        assert_eq!(loaded.types["score"], SemanticType::Categorical);
        assert_eq!(loaded.dataset.column("score").unwrap().data.kind(), "category");
    }
}

#[test]
fn ordinal_override_keeps_caller_order() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "sizes.csv",
        &single_column_csv("size", &["tall", "grande", "venti", "tall"]),
    );
    let loader = loader();
    let order = vec!["tall".to_string(), "grande".to_string(), "venti".to_string()];
    loader
        .set_column_type(&path, "size", SemanticType::Ordinal, Some(order.clone()))
        .unwrap();

    let loaded = loader.load(&path, &ReadOptions::default()).unwrap();
    assert_eq!(loaded.types["size"], SemanticType::Ordinal);
    assert_eq!(loaded.orders["size"], order);
}

#[test]
fn zero_one_columns_are_binary_not_numeric() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("flags.csv", &single_column_csv("flag", &["0", "1", "1", "0", "1"]));
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();

    assert_eq!(loaded.types["flag"], SemanticType::Binary);
    assert_eq!(
        loaded.dataset.column("flag").unwrap().data,
        ColumnData::Integer(vec![Some(0), Some(1), Some(1), Some(0), Some(1)])
    );
}

fn mixed_column(numeric: usize, total: usize) -> String {
    let values = (0..total)
        .map(|i| {
            if i < numeric {
                (i + 1).to_string()
            } else {
                format!("code_{i}")
            }
        })
        .collect::<Vec<_>>();
    let refs = values.iter().map(String::as_str).collect::<Vec<_>>();
    single_column_csv("reading", &refs)
}

#[test]
fn eighty_percent_numeric_is_numeric() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("mixed.csv", &mixed_column(80, 100));
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();

    assert_eq!(loaded.types["reading"], SemanticType::Numeric);
    let data = &loaded.dataset.column("reading").unwrap().data;
    let missing = text_column(data).iter().filter(|cell| cell.is_none()).count();
    assert_eq!(missing, 20);
}

#[test]
fn seventy_nine_percent_numeric_is_not_numeric() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("mixed.csv", &mixed_column(79, 100));
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();

    assert_ne!(loaded.types["reading"], SemanticType::Numeric);
    assert_eq!(loaded.types["reading"], SemanticType::Categorical);
}

#[test]
fn dates_round_trip_between_formats() {
    let workspace = TestWorkspace::new();
    let original = ["2024-01-15", "2024-02-20", "2024-03-25"];
    let path = workspace.write("visits.csv", &single_column_csv("visit", &original));
    let loader = loader();
    let mut loaded = loader.load(&path, &ReadOptions::default()).unwrap();
    assert_eq!(loaded.types["visit"], SemanticType::Date);
    assert!(loaded.ambiguous_dates.is_empty());

    let failed = loader
        .standardize_dates(&mut loaded, "visit", "%m/%d/%Y", None)
        .unwrap();
    assert_eq!(failed, 0);
    assert_eq!(
        text_column(&loaded.dataset.column("visit").unwrap().data),
        vec![
            Some("01/15/2024".to_string()),
            Some("02/20/2024".to_string()),
            Some("03/25/2024".to_string()),
        ]
    );

    loader
        .standardize_dates(&mut loaded, "visit", "YYYY-MM-DD", Some("MM/DD/YYYY"))
        .unwrap();
    let round_trip = text_column(&loaded.dataset.column("visit").unwrap().data);
    assert_eq!(
        round_trip,
        original.iter().map(|v| Some(v.to_string())).collect::<Vec<_>>()
    );
}

#[test]
fn standardization_is_reapplied_on_reload() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "visits.csv",
        &single_column_csv("visit", &["2024-01-15", "2024-02-20"]),
    );
    let loader = loader();
    let mut loaded = loader.load(&path, &ReadOptions::default()).unwrap();
    loader
        .standardize_dates(&mut loaded, "visit", "DD.MM.YYYY", None)
        .unwrap();

    let reloaded = loader.load(&path, &ReadOptions::default()).unwrap();
    assert_eq!(
        text_column(&reloaded.dataset.column("visit").unwrap().data),
        vec![Some("15.01.2024".to_string()), Some("20.02.2024".to_string())]
    );
    let sidecar = SidecarFileStore::new().load(&path).unwrap().unwrap();
    let entry = &sidecar.date_standardized["visit"];
    assert_eq!(entry.target_format, "DD.MM.YYYY");
    assert_eq!(entry.original_format.as_deref(), Some("YYYY-MM-DD"));
    assert!(entry.standardized);
}

#[test]
fn day_month_ties_are_flagged_as_ambiguous() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "appointments.csv",
        &single_column_csv("when", &["01/02/2024", "03/04/2024", "05/06/2024"]),
    );
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();

    assert_eq!(loaded.types["when"], SemanticType::Date);
    assert_eq!(loaded.ambiguous_dates, vec!["when".to_string()]);
    let decision = &loaded.dates["when"];
    assert!(decision.ambiguous);
    let top = decision
        .candidates
        .iter()
        .take(2)
        .map(|c| c.display_name.as_str())
        .collect::<Vec<_>>();
    assert!(top.contains(&"MM/DD/YYYY"));
    assert!(top.contains(&"DD/MM/YYYY"));
}

#[test]
fn windows_1252_input_is_readable() {
    let workspace = TestWorkspace::new();
    let path = workspace.write_bytes(
        "cities.csv",
        b"name,city\nJos\xe9,M\xfcnchen\nAna,Z\xfcrich\nLe\xf3n,Malm\xf6\n",
    );
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();
    assert_eq!(loaded.dataset.row_count(), 3);
    assert_eq!(loaded.dataset.column_names(), vec!["name", "city"]);

    let hinted = loader()
        .load(
            &path,
            &ReadOptions {
                encoding: Some("windows-1252".to_string()),
                ..ReadOptions::default()
            },
        )
        .unwrap();
    assert_eq!(
        hinted.dataset.column("name").unwrap().data.cell_text(0).as_deref(),
        Some("José")
    );
    assert!(matches!(
        hinted.source,
        SourceFormat::Delimited {
            encoding: "windows-1252",
            ..
        }
    ));
}

#[test]
fn semicolon_files_are_split_correctly() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("euro.csv", "id;amount;label\n1;3,5;a\n2;4,0;b\n3;1,5;c\n");
    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();
    assert_eq!(loaded.dataset.column_names(), vec!["id", "amount", "label"]);
    assert!(matches!(
        loaded.source,
        SourceFormat::Delimited {
            delimiter: b';',
            ..
        }
    ));
}

#[test]
fn renaming_moves_every_sidecar_entry() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "levels.csv",
        &single_column_csv("lvl", &["Low", "High", "Medium"]),
    );
    let loader = loader();
    let mut loaded = loader.load(&path, &ReadOptions::default()).unwrap();
    loader.rename_column(&mut loaded, "lvl", "level").unwrap();

    assert_eq!(loaded.dataset.column_names(), vec!["level"]);
    assert_eq!(loaded.types["level"], SemanticType::Ordinal);
    let sidecar = SidecarFileStore::new().load(&path).unwrap().unwrap();
    assert!(sidecar.types.contains_key("level"));
    assert!(!sidecar.types.contains_key("lvl"));
    assert_eq!(
        sidecar.order_for("level"),
        Some(vec!["Low".to_string(), "Medium".to_string(), "High".to_string()])
    );
}

#[test]
fn corrupt_sidecar_does_not_block_loading() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("data.csv", "id,status\n1,yes\n2,no\n3,yes\n");
    workspace.write("data.schema.yml", "types: [unterminated\n");

    let loaded = loader().load(&path, &ReadOptions::default()).unwrap();
    assert_eq!(loaded.sidecar_state, SidecarState::Unavailable);
    assert_eq!(loaded.types["status"], SemanticType::Binary);
}

#[test]
fn missing_files_are_reported() {
    let workspace = TestWorkspace::new();
    let err = loader()
        .load(&workspace.path().join("absent.csv"), &ReadOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("absent.csv"));
}
