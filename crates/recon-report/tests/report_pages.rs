use recon_quality::{parse_model_analyzer, persist_model_stats, ModelStats};
use recon_report::{write_report, ReportError, ReportOptions, TemplatesFile};
use std::fs;
use std::path::Path;

const ANALYZER: &str = "\
I0512 model.cc:10] Cameras: 1
I0512 model.cc:11] Images: 120
I0512 model.cc:12] Registered images: 118
I0512 model.cc:13] Points: 45012
I0512 model.cc:17] Mean reprojection error: 0.612px
";

fn project_fixture(data: &Path) {
    let project = data.join("DJI_0042");
    fs::create_dir_all(project.join("frames")).unwrap();
    fs::create_dir_all(project.join("colmap/sparse/0")).unwrap();
    fs::write(project.join("DJI_0042.MP4"), b"").unwrap();
    fs::write(project.join("frames/DJI_0042_frame_00001.jpg"), b"").unwrap();

    let record = parse_model_analyzer("model_analyzer", ANALYZER);
    let stats = ModelStats::from_record("colmap", &record);
    persist_model_stats(
        &project.join("colmap/stats/model_analyzer-sparse-0.json"),
        &stats,
        ANALYZER,
    )
    .unwrap();

    fs::create_dir_all(data.join("calibration")).unwrap();
}

#[test]
fn index_lists_every_project_but_pages_only_prefixed_ones() {
    let data = tempfile::tempdir().unwrap();
    let site = tempfile::tempdir().unwrap();
    project_fixture(data.path());

    let written = write_report(
        data.path(),
        site.path(),
        TemplatesFile::builtin(),
        &ReportOptions::default(),
    )
    .unwrap();

    assert_eq!(
        written,
        vec![site.path().join("index.qmd"), site.path().join("DJI_0042.qmd")]
    );

    let index = fs::read_to_string(site.path().join("index.qmd")).unwrap();
    assert!(index.starts_with("---\ntitle: \"Project Index\""));
    assert!(index.contains("## [DJI_0042](DJI_0042.html)"));
    assert!(index.contains("## [calibration](calibration.html)"));
    assert!(!site.path().join("calibration.qmd").exists());
}

#[test]
fn project_page_lists_folders_and_stats() {
    let data = tempfile::tempdir().unwrap();
    let site = tempfile::tempdir().unwrap();
    project_fixture(data.path());

    write_report(
        data.path(),
        site.path(),
        TemplatesFile::builtin(),
        &ReportOptions::default(),
    )
    .unwrap();

    let page = fs::read_to_string(site.path().join("DJI_0042.qmd")).unwrap();
    assert!(page.contains("# Project: DJI_0042"));
    assert!(page.contains("## Folder: colmap"));
    assert!(page.contains("- Subfolders: sparse, stats"));
    assert!(page.contains("- Files: DJI_0042_frame_00001.jpg"));
    assert!(page.contains("## Files at project root\nDJI_0042.MP4"));
    assert!(page.contains("| colmap | 118/120 | 45012 | ? |"));
}

#[test]
fn custom_prefix_and_templates() {
    let data = tempfile::tempdir().unwrap();
    let site = tempfile::tempdir().unwrap();
    project_fixture(data.path());

    let templates = TemplatesFile::from_yaml(
        r#"
templates:
  index:
    template: "{{#each projects}}{{this}};{{/each}}"
  project:
    template: "{{project}} has {{#each folders}}{{name}} {{/each}}"
"#,
    )
    .unwrap();
    let options = ReportOptions {
        project_prefix: "cal".into(),
        ..ReportOptions::default()
    };
    write_report(data.path(), site.path(), templates, &options).unwrap();

    assert_eq!(
        fs::read_to_string(site.path().join("index.qmd")).unwrap(),
        "DJI_0042;calibration;"
    );
    assert_eq!(
        fs::read_to_string(site.path().join("calibration.qmd")).unwrap(),
        "calibration has "
    );
    assert!(!site.path().join("DJI_0042.qmd").exists());
}

#[test]
fn missing_data_directory() {
    let site = tempfile::tempdir().unwrap();
    let err = write_report(
        &site.path().join("absent"),
        site.path(),
        TemplatesFile::builtin(),
        &ReportOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ReportError::Recon(_)));
}
