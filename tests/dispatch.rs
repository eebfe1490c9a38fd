#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use rfam_genome_pipeline::config::LsfSettings;
use rfam_genome_pipeline::dispatch::{
    DispatchOutcome, Dispatcher, LocalProcessDispatcher, LsfDispatcher,
};
use rfam_genome_pipeline::domain::{Domain, GenomeJob};
use rfam_genome_pipeline::error::PipelineError;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn job(root: &Path) -> GenomeJob {
    GenomeJob {
        genome_id: "UP000005640".parse().unwrap(),
        assembly: Some("GCA_000001405".parse().unwrap()),
        domain: Domain::Eukaryota,
        project_root: Utf8PathBuf::from_path_buf(root.join("rfam15")).unwrap(),
    }
}

#[test]
fn bsub_job_id_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let args_file = temp.path().join("bsub.args");
    let bsub = script(
        temp.path(),
        "bsub",
        &format!(
            "printf '%s\\n' \"$@\" > {}\necho 'Job <8812> is submitted to queue <production>.'",
            args_file.display()
        ),
    );
    let settings = LsfSettings {
        submit_command: bsub.to_string_lossy().to_string(),
        ..LsfSettings::default()
    };
    let dispatcher = LsfDispatcher::new(
        settings,
        PathBuf::from("/opt/rfam/rfam-genomes"),
        vec!["--config".to_string(), "/etc/rfam.json".to_string()],
    );

    let outcome = dispatcher.dispatch(&job(temp.path())).unwrap();
    assert_matches!(outcome, DispatchOutcome::Submitted { job_id: Some(id) } if id == "8812");

    let args: Vec<String> = fs::read_to_string(&args_file)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(args[0], "-M");
    assert!(args.contains(&"UP000005640".to_string()));
    assert_eq!(args.last().unwrap(), "/etc/rfam.json");
}

#[test]
fn bsub_rejection_is_a_dispatch_error() {
    let temp = tempfile::tempdir().unwrap();
    let bsub = script(temp.path(), "bsub", "echo 'User permission denied' >&2\nexit 255");
    let settings = LsfSettings {
        submit_command: bsub.to_string_lossy().to_string(),
        ..LsfSettings::default()
    };
    let dispatcher = LsfDispatcher::new(settings, PathBuf::from("rfam-genomes"), Vec::new());

    let err = dispatcher.dispatch(&job(temp.path())).unwrap_err();
    assert_matches!(err, PipelineError::Dispatch { message, .. } if message.contains("permission denied"));
}

#[test]
fn local_child_report_is_collected() {
    let temp = tempfile::tempdir().unwrap();
    let child = script(
        temp.path(),
        "child",
        r#"cat <<'EOF'
{"genome_id":"UP000005640","domain":"Eukaryota","workspace":"/w","expected":2,
 "downloaded":["CM000663.2"],"already_present":[],
 "failures":[{"accession":"CM000664.2","error":"ENA returned status 500"}],
 "missing":["CM000664.2"]}
EOF
exit 4"#,
    );
    let dispatcher = LocalProcessDispatcher::new(child, Vec::new());

    let outcome = dispatcher.dispatch(&job(temp.path())).unwrap();
    assert_matches!(outcome, DispatchOutcome::Completed { report } => {
        assert!(!report.is_complete());
        assert_eq!(report.missing, vec!["CM000664.2".to_string()]);
    });
}

#[test]
fn local_child_crash_is_a_dispatch_error() {
    let temp = tempfile::tempdir().unwrap();
    let child = script(temp.path(), "child", "exit 1");
    let dispatcher = LocalProcessDispatcher::new(child, Vec::new());
    assert_matches!(
        dispatcher.dispatch(&job(temp.path())),
        Err(PipelineError::Dispatch { .. })
    );
}

#[test]
fn local_child_without_report_is_a_dispatch_error() {
    let temp = tempfile::tempdir().unwrap();
    let child = script(temp.path(), "child", "echo 'all done'\nexit 0");
    let dispatcher = LocalProcessDispatcher::new(child, Vec::new());

    let err = dispatcher.dispatch(&job(temp.path())).unwrap_err();
    assert_matches!(err, PipelineError::Dispatch { genome_id, message }
        if genome_id == "UP000005640" && message.contains("without a readable report"));
}

#[test]
fn local_child_args() {
    let dispatcher = LocalProcessDispatcher::new(
        PathBuf::from("rfam-genomes"),
        vec!["--config".to_string(), "/etc/rfam.json".to_string()],
    );
    let args = dispatcher.command_args(&job(Path::new("/data")));
    assert_eq!(args[0], "materialize");
    assert!(args.contains(&"--json".to_string()));
    assert!(args.contains(&"/data/rfam15".to_string()));
    assert_eq!(args.last().unwrap(), "/etc/rfam.json");
}
