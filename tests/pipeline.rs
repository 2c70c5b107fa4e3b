mod common;

use assert_matches::assert_matches;

use geostage::config::ResolvedConfig;
use geostage::domain::UploadCandidate;
use geostage::error::StageError;
use geostage::inspect::SignatureInspector;
use geostage::pipeline::{NoProgress, Pipeline};
use geostage::staging::StagingDirectory;

use common::{AcceptAll, RejectNames, shape_header, shapefile_set, sorted, zip_of, zip_owned};

fn scenario_archive() -> Vec<u8> {
    let inner = zip_of(&[("data.shp", &shape_header())]);
    let mut entries = shapefile_set("data");
    entries.push(("extra.zip".to_string(), inner));
    zip_owned(&entries)
}

#[test]
fn nested_partial_shapefile_is_reported_and_excluded() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), SignatureInspector);
    let mut staging = StagingDirectory::temporary().unwrap();

    let result = pipeline
        .run(
            vec![UploadCandidate::new("upload.zip", scenario_archive())],
            &mut staging,
            &NoProgress,
        )
        .unwrap();

    assert_eq!(
        sorted(result.accepted_names()),
        vec!["data.dbf", "data.prj", "data.shp", "data.shx"]
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].field, "file");
    assert_matches!(
        &result.errors[0].error,
        StageError::IncompleteFormat { base_name, missing, .. }
            if base_name == "extra_data" && missing.len() == 3
    );
    // Rejected files stay on disk; only the result excludes them.
    assert!(
        staging
            .files_on_disk()
            .unwrap()
            .contains(&"extra_data.shp".to_string())
    );
}

#[test]
fn same_archive_twice_yields_same_names() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut first = StagingDirectory::temporary().unwrap();
    let mut second = StagingDirectory::temporary().unwrap();

    let a = pipeline
        .run(
            vec![UploadCandidate::new("upload.zip", scenario_archive())],
            &mut first,
            &NoProgress,
        )
        .unwrap();
    let b = pipeline
        .run(
            vec![UploadCandidate::new("upload.zip", scenario_archive())],
            &mut second,
            &NoProgress,
        )
        .unwrap();

    assert_ne!(a.staging_dir, b.staging_dir);
    assert_eq!(a.accepted_names(), b.accepted_names());
}

#[test]
fn unsupported_extension_yields_exactly_one_error() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();

    let result = pipeline
        .run(
            vec![
                UploadCandidate::new("notes.txt", b"hello".to_vec()),
                UploadCandidate::new("roads.geojson", b"{\"type\":\"Feature\"}".to_vec()),
            ],
            &mut staging,
            &NoProgress,
        )
        .unwrap();

    assert_eq!(result.accepted_names(), vec!["roads.geojson"]);
    assert_eq!(result.errors_with_code("unsupported_extension").len(), 1);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn inspector_rejection_leaves_siblings_alone() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), RejectNames::new(&["data.dbf"]));
    let mut staging = StagingDirectory::temporary().unwrap();
    let archive = zip_owned(&shapefile_set("data"));

    let result = pipeline
        .run(
            vec![UploadCandidate::new("upload.zip", archive)],
            &mut staging,
            &NoProgress,
        )
        .unwrap();

    assert_eq!(
        sorted(result.accepted_names()),
        vec!["data.prj", "data.shp", "data.shx"]
    );
    assert_eq!(result.errors.len(), 1);
    assert_matches!(&result.errors[0].error, StageError::UnreadableFile { path } if path.ends_with("data.dbf"));
}

#[test]
fn empty_files_are_unreadable() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();

    let result = pipeline
        .run(
            vec![UploadCandidate::new("empty.csv", Vec::new())],
            &mut staging,
            &NoProgress,
        )
        .unwrap();

    assert!(result.accepted.is_empty());
    assert_eq!(result.errors_with_code("unreadable_file").len(), 1);
}

#[test]
fn loose_shapefile_parts_are_checked_for_completeness() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();
    let candidates = shapefile_set("roads")
        .into_iter()
        .filter(|(name, _)| !name.ends_with(".shx"))
        .map(|(name, content)| UploadCandidate::new(name, content))
        .collect();

    let result = pipeline.run(candidates, &mut staging, &NoProgress).unwrap();

    assert!(result.accepted.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message(), "shapefile roads is missing .shx");
}

#[test]
fn incomplete_groups_can_be_advisory() {
    let config = ResolvedConfig {
        incomplete_blocks: false,
        ..ResolvedConfig::default()
    };
    let pipeline = Pipeline::new(config, AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();

    let result = pipeline
        .run(
            vec![UploadCandidate::new("upload.zip", scenario_archive())],
            &mut staging,
            &NoProgress,
        )
        .unwrap();

    assert_eq!(result.accepted.len(), 5);
    assert_eq!(result.errors_with_code("incomplete_format").len(), 1);
}

#[test]
fn plain_upload_and_archive_member_with_same_name_collide() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();
    let archive = zip_of(&[("roads.csv", b"from,zip\n")]);

    let result = pipeline
        .run(
            vec![
                UploadCandidate::new("upload.zip", archive),
                UploadCandidate::new("roads.csv", b"from,plain\n".to_vec()),
            ],
            &mut staging,
            &NoProgress,
        )
        .unwrap();

    assert_eq!(result.accepted_names(), vec!["roads.csv"]);
    assert_eq!(result.accepted[0].source_chain, vec!["roads.csv"]);
    assert_eq!(result.errors_with_code("duplicate_file").len(), 1);
}

#[test]
fn unreadable_top_level_archive_aborts_the_run() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();

    let err = pipeline
        .run(
            vec![UploadCandidate::new(
                "broken.zip",
                b"PK\x03\x04truncated".to_vec(),
            )],
            &mut staging,
            &NoProgress,
        )
        .unwrap_err();

    assert_matches!(err, StageError::ArchiveOpen { .. });
}

#[test]
fn empty_batch_returns_both_lists() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();

    let result = pipeline.run(Vec::new(), &mut staging, &NoProgress).unwrap();

    assert!(result.accepted.is_empty());
    assert!(result.errors.is_empty());
}

#[test]
fn result_serializes_errors_with_codes() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();
    let result = pipeline
        .run(
            vec![UploadCandidate::new("notes.txt", b"hello".to_vec())],
            &mut staging,
            &NoProgress,
        )
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["accepted"].as_array().unwrap().len(), 0);
    assert_eq!(json["errors"][0]["code"], "unsupported_extension");
    assert_eq!(json["errors"][0]["field"], "file");
}

#[test]
fn carried_source_chain_prefixes_every_accepted_file() {
    let pipeline = Pipeline::new(ResolvedConfig::default(), AcceptAll);
    let mut staging = StagingDirectory::temporary().unwrap();
    let archive = zip_of(&[("roads.csv", b"a,b\n")]);
    let chain = vec!["batch-7.tar".to_string()];

    let result = pipeline
        .run(
            vec![
                UploadCandidate::new("upload.zip", archive).with_source_chain(chain.clone()),
                UploadCandidate::new("rivers.csv", b"x,y\n".to_vec())
                    .with_source_chain(chain),
            ],
            &mut staging,
            &NoProgress,
        )
        .unwrap();

    assert!(result.errors.is_empty());
    assert_eq!(result.accepted_names(), vec!["rivers.csv", "roads.csv"]);
    assert_eq!(
        result.accepted[0].source_chain,
        vec!["batch-7.tar", "rivers.csv"]
    );
    assert_eq!(
        result.accepted[1].source_chain,
        vec!["batch-7.tar", "upload.zip", "roads.csv"]
    );
    for path in result.accepted_paths() {
        assert!(path.starts_with(&result.staging_dir));
        assert!(path.as_std_path().is_file());
    }
}
