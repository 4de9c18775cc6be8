//! Integration tests: run the librarian CLI against seeded corpora in temp
//! dirs and assert on report contents and command output.

use std::path::PathBuf;
use std::process::Command;

fn librarian() -> Command {
    let root = project_root();
    let exe = std::env::var("CARGO_BIN_EXE_librarian")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            // Try release first (CI uses --release), then debug
            let release_path = root.join("target/release/librarian");
            if release_path.exists() {
                release_path
            } else {
                root.join("target/debug/librarian")
            }
        });
    let mut c = Command::new(&exe);
    c.current_dir(&root);
    c
}

fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Temp dir inside the project so the spawned process can read it (e.g.
/// under sandbox).
fn test_root(name: &str) -> PathBuf {
    let root = project_root().join("target").join("it").join(name);
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();
    root
}

fn write_file(root: &std::path::Path, marketplace: &str, plugin: &str, name: &str, content: &str) {
    let dir = root.join(marketplace).join(plugin);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), content).unwrap();
}

fn run_scan(root: &std::path::Path) -> std::process::Output {
    let out = librarian()
        .args(["--root", &root.to_string_lossy(), "scan"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "scan failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    out
}

fn read_report(root: &std::path::Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(root.join(".librarian/report.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

const FOX: &str = "The quick brown fox jumps over the lazy dog. ";

/// A body of text that shares no vocabulary with FOX or other topics.
fn distinct_body(topic: &str) -> String {
    (0..30).map(|i| format!("{}-{} ", topic, i)).collect()
}

#[test]
fn identical_files_across_marketplaces_cluster() {
    let root = test_root("cross_pair");
    let _guard = RemoveOnDrop(root.clone());
    let body = FOX.repeat(20);
    write_file(&root, "mA", "p1", "x.md", &body);
    write_file(&root, "mB", "p1", "x.md", &body);

    run_scan(&root);
    let report = read_report(&root);

    assert_eq!(report["summary"]["total_files_scanned"], 2);
    assert_eq!(report["summary"]["files_in_clusters"], 2);
    assert_eq!(report["summary"]["unclustered_files"], 0);
    let clusters = report["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["type"], "cross-marketplace");
    assert_eq!(clusters[0]["size"], 2);
    assert_eq!(clusters[0]["avg_similarity"], 1.0);
    let marketplaces = clusters[0]["marketplaces"].as_array().unwrap();
    assert_eq!(marketplaces.len(), 2);
}

#[test]
fn yaml_frontmatter_files_co_cluster() {
    let root = test_root("frontmatter");
    let _guard = RemoveOnDrop(root.clone());
    // hyphen preservation is load-bearing: the payload is a YAML block plus
    // a run of identical words
    let words = "architecture guidance for scalable backend services ".repeat(6);
    let body = format!(
        "---\nname: backend-architect\ndescription: design backends\n---\n{}",
        words
    );
    write_file(&root, "mA", "p1", "agent.md", &body);
    write_file(&root, "mB", "p2", "agent.md", &body);

    run_scan(&root);
    let report = read_report(&root);

    assert_eq!(report["summary"]["files_in_clusters"], 2);
    assert_eq!(report["clusters"].as_array().unwrap().len(), 1);
}

#[test]
fn scaffold_cluster_of_25_skill_files() {
    let root = test_root("scaffold");
    let _guard = RemoveOnDrop(root.clone());
    let body = FOX.repeat(20);
    for i in 0..25 {
        write_file(&root, &format!("m{:02}", i), &format!("p{:02}", i), "SKILL.md", &body);
    }

    run_scan(&root);
    let report = read_report(&root);

    let clusters = report["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["size"], 25);
    assert_eq!(clusters[0]["type"], "scaffold");
    assert_eq!(report["filename_index"]["SKILL.md"][0], 0);
}

#[test]
fn internal_cluster_within_one_marketplace() {
    let root = test_root("internal");
    let _guard = RemoveOnDrop(root.clone());
    let body = FOX.repeat(20);
    write_file(&root, "mA", "p1", "a.md", &body);
    write_file(&root, "mA", "p2", "b.md", &body);
    write_file(&root, "mA", "p3", "c.md", &body);

    run_scan(&root);
    let report = read_report(&root);

    let clusters = report["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["type"], "internal");
    let marketplaces = clusters[0]["marketplaces"].as_array().unwrap();
    assert_eq!(marketplaces.len(), 1);
    assert_eq!(marketplaces[0], "mA");
}

#[test]
fn unclustered_tail_is_counted() {
    let root = test_root("tail");
    let _guard = RemoveOnDrop(root.clone());
    let body = FOX.repeat(20);
    write_file(&root, "mA", "p1", "x.md", &body);
    write_file(&root, "mB", "p1", "x.md", &body);
    for (i, topic) in ["sailing", "sourdough", "climbing", "jazz", "succulents"]
        .iter()
        .enumerate()
    {
        write_file(&root, "mC", &format!("p{}", i), "doc.md", &distinct_body(topic));
    }

    run_scan(&root);
    let report = read_report(&root);

    assert_eq!(report["summary"]["total_files_scanned"], 7);
    assert_eq!(report["summary"]["files_in_clusters"], 2);
    assert_eq!(report["summary"]["unclustered_files"], 5);
    assert_eq!(report["clusters"].as_array().unwrap().len(), 1);
}

#[test]
fn extreme_ratio_warning_fires_on_large_sparse_corpus() {
    let root = test_root("sanity_ratio");
    let _guard = RemoveOnDrop(root.clone());
    // 600 mutually dissimilar files plus 6 identical pairs: ratio = 12/612
    for i in 0..600 {
        write_file(
            &root,
            &format!("m{}", i % 3),
            &format!("p{:03}", i),
            "doc.md",
            &distinct_body(&format!("topic{:03}", i)),
        );
    }
    let body = FOX.repeat(20);
    for i in 0..6 {
        write_file(&root, "m0", &format!("dup{}", i), "left.md", &body.replace("dog", &format!("dog{}", i)));
        write_file(&root, "m1", &format!("dup{}", i), "right.md", &body.replace("dog", &format!("dog{}", i)));
    }

    let out = run_scan(&root);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("warning:"), "stdout: {}", stdout);

    let report = read_report(&root);
    let warnings = report["metadata"]["warnings"].as_array().unwrap();
    assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("extreme")));
    assert_ne!(report["metadata"]["confidence"], "high");
}

#[test]
fn where_finds_cluster_by_glob_and_path() {
    let root = test_root("where");
    let _guard = RemoveOnDrop(root.clone());
    let body = FOX.repeat(20);
    write_file(&root, "mA", "p1", "SKILL.md", &body);
    write_file(&root, "mB", "p2", "SKILL.md", &body);
    write_file(&root, "mC", "p3", "solo.md", &distinct_body("woodwork"));
    run_scan(&root);

    let root_str = root.to_string_lossy().into_owned();
    let out = librarian()
        .args(["--root", &root_str, "where", "SKILL.*"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("cluster 0"));
    assert!(stdout.contains("cross-marketplace"));
    assert!(stdout.contains("mA/p1/SKILL.md"));
    assert!(stdout.contains("mB/p2/SKILL.md"));

    // unclustered match via substring
    let out = librarian()
        .args(["--root", &root_str, "where", "solo"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("unclustered matches:"));
    assert!(stdout.contains("mC/p3/solo.md"));
}

#[test]
fn compare_and_impact_classify_targets() {
    let root = test_root("compare");
    let _guard = RemoveOnDrop(root.clone());
    let body = FOX.repeat(20);
    // mNew/p1 duplicates mBase/p1; mNew/p2 is novel
    write_file(&root, "mBase", "p1", "guide.md", &body);
    write_file(&root, "mNew", "p1", "guide.md", &body);
    write_file(&root, "mNew", "p2", "fresh.md", &distinct_body("letterpress"));
    run_scan(&root);

    let root_str = root.to_string_lossy().into_owned();
    let out = librarian()
        .args(["--root", &root_str, "compare", "mNew", "mBase"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("target files: 2"));
    assert!(stdout.contains("redundant-with-reference: 1"));
    assert!(stdout.contains("novel: 1"));

    // impact against an installed inventory listing mBase
    std::fs::write(
        root.join("installed.yaml"),
        "installed:\n  - marketplace: mBase\n",
    )
    .unwrap();
    let out = librarian()
        .args(["--root", &root_str, "impact", "mNew"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("novelty: 50.0%"), "stdout: {}", stdout);
}

#[test]
fn stats_reports_summary_and_json_mode_parses() {
    let root = test_root("stats");
    let _guard = RemoveOnDrop(root.clone());
    let body = FOX.repeat(20);
    write_file(&root, "mA", "p1", "x.md", &body);
    write_file(&root, "mB", "p1", "x.md", &body);
    write_file(&root, "mC", "p1", "y.md", &distinct_body("calligraphy"));
    run_scan(&root);

    let root_str = root.to_string_lossy().into_owned();
    let out = librarian()
        .args(["--root", &root_str, "stats"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("files scanned: 3"));
    assert!(stdout.contains("files in clusters: 2"));
    assert!(stdout.contains("confidence: high"));

    let out = librarian()
        .args(["--root", &root_str, "--json", "stats"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stats --json must emit valid JSON");
    assert_eq!(parsed["total_files_scanned"], 3);
    assert_eq!(parsed["unique_clusters"], 1);
}

#[test]
fn find_greps_frontmatter() {
    let root = test_root("find");
    let _guard = RemoveOnDrop(root.clone());
    let padding = "body text that satisfies the minimum content length requirement ".repeat(3);
    write_file(
        &root,
        "mA",
        "p1",
        "agent.md",
        &format!("---\nname: backend-architect\ndescription: design backends\n---\n{}", padding),
    );
    write_file(
        &root,
        "mA",
        "p2",
        "other.md",
        &format!("---\nname: data-wrangler\n---\n{}", padding),
    );

    let root_str = root.to_string_lossy().into_owned();
    let out = librarian()
        .args(["--root", &root_str, "find", "backend"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("backend-architect"));
    assert!(!stdout.contains("data-wrangler"));
}

#[test]
fn missing_report_is_a_nonzero_exit() {
    let root = test_root("missing_report");
    let _guard = RemoveOnDrop(root.clone());
    let out = librarian()
        .args(["--root", &root.to_string_lossy(), "stats"])
        .output()
        .unwrap();
    assert!(!out.status.success());
}

#[test]
fn scan_of_empty_corpus_is_a_nonzero_exit() {
    let root = test_root("empty_corpus");
    let _guard = RemoveOnDrop(root.clone());
    let out = librarian()
        .args(["--root", &root.to_string_lossy(), "scan"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no corpus"), "stderr: {}", stderr);
}

/// Guard that removes the directory when dropped (end of test).
struct RemoveOnDrop(std::path::PathBuf);
impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
