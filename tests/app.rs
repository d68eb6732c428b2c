mod common;

use bids2isatab::app::{ConvertOptions, Converter};
use bids2isatab::config::{ConfigLoader, ConfigOverrides};
use bids2isatab::output::{JsonOutput, TextOutput};

use common::Fixture;

#[test]
fn cli_style_run_with_config_file() {
    let fixture = Fixture::two_subjects();
    fixture.json(
        "sub-01/anat/sub-01_T1w.json",
        r#"{"SoftwareVersions": "syngo MR E11"}"#,
    );
    let config_path = fixture.json(
        "code/bids2isatab.json",
        r#"{"parameter_names": {"SoftwareVersions": "software version"}}"#,
    );

    let resolved = ConfigLoader::resolve(
        Some(config_path.as_str()),
        ConfigOverrides {
            keep_unknown: true,
            drop_parameters: vec![],
        },
    )
    .unwrap();
    let converter = Converter::new(ConvertOptions::new(
        fixture.root.clone(),
        fixture.output.clone(),
        resolved,
    ));
    assert!(converter.options().filter.keep_unknown);

    let report = converter.run(&JsonOutput).unwrap();
    let assay = fixture.read_output("a_mri.txt");
    assert!(assay.lines().next().unwrap().contains("Parameter Value[software version]"));
    let investigation = fixture.read_output("i_investigation.txt");
    assert!(investigation.contains("software version"));

    let mut summary = Vec::new();
    TextOutput::write_report(&mut summary, &report).unwrap();
    let summary = String::from_utf8(summary).unwrap();
    assert!(summary.contains("Subjects: 2, data files: 2, assay rows: 2"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["assay_rows"], 2);
    assert_eq!(json["files"].as_array().unwrap().len(), 3);
}
