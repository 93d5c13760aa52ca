use std::fs;
use std::path::Path;

use hostfit::config::ScanSettings;
use hostfit::contract::{generate_contract, validate_contract};
use hostfit::profile::HostProfile;
use hostfit::{fleet, scanner, CheckOptions};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn ml_repo(root: &Path) {
    write(
        root,
        "pyproject.toml",
        "[project]\nname = \"trainer\"\nrequires-python = \">=3.10,<3.12\"\ndependencies = [\"torch>=2.1\"]\n",
    );
    write(root, "train.py", "import torch\nx = torch.zeros(1).to('cuda')\n");
}

#[test]
fn simulated_gpu_host_clears_cuda_finding() {
    let repo = tempfile::tempdir().unwrap();
    ml_repo(repo.path());
    let hosts = tempfile::tempdir().unwrap();
    let laptop = hosts.path().join("laptop.json");
    let server = hosts.path().join("server.json");
    fs::write(&laptop, r#"{"os": "linux", "python_version": "3.11.4"}"#).unwrap();
    fs::write(
        &server,
        r#"{"host": {"os": "linux", "python_version": "3.11.4", "cuda_available": true, "cuda_version": "12.2", "ram_gb": 64}}"#,
    )
    .unwrap();

    let on_laptop = fleet::simulate(repo.path(), &laptop, &CheckOptions::default()).unwrap();
    assert!(on_laptop.simulated);
    assert!(on_laptop
        .findings
        .iter()
        .any(|f| f.rule_id == "torch_cuda_mismatch"));
    assert!(on_laptop.score.probability < 100);

    let on_server = fleet::simulate(repo.path(), &server, &CheckOptions::default()).unwrap();
    assert!(!on_server
        .findings
        .iter()
        .any(|f| f.rule_id == "torch_cuda_mismatch"));
    assert!(on_server.score.probability > on_laptop.score.probability);
}

#[test]
fn missing_host_file_is_an_error() {
    let repo = tempfile::tempdir().unwrap();
    ml_repo(repo.path());
    let err = fleet::simulate(
        repo.path(),
        &repo.path().join("nope.json"),
        &CheckOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn contract_round_trip_against_hosts() {
    let repo = tempfile::tempdir().unwrap();
    ml_repo(repo.path());
    let profile = scanner::scan_repo(repo.path(), &ScanSettings::default()).unwrap();
    let contract = generate_contract(&profile);
    assert_eq!(contract.repo, "trainer");
    assert!(contract.requires.cuda);

    let cpu_only = HostProfile {
        python_version: Some("3.11.4".into()),
        ..Default::default()
    };
    let reqs: Vec<String> = validate_contract(&contract, &cpu_only)
        .into_iter()
        .map(|v| v.requirement)
        .collect();
    assert_eq!(reqs, vec!["cuda".to_string()]);

    let gpu = HostProfile {
        cuda_available: true,
        ..cpu_only
    };
    assert!(validate_contract(&contract, &gpu).is_empty());
}
