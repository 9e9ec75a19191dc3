//! Integration tests for Toonflow
//!
//! These tests drive the CLI end to end with the offline generator, so every
//! phase produces deterministic placeholder content.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a toonflow Command isolated from the caller's environment
fn toonflow(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("toonflow");
    cmd.current_dir(dir.path())
        .env_remove("TOONFLOW_GENERATOR_CMD")
        .env_remove("TOONFLOW_SESSION")
        .env_remove("TOONFLOW_AUTO_NEXT")
        .env_remove("TOONFLOW_LOG")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper to initialize a project with no regeneration settle delay
fn init_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    toonflow(&dir).arg("init").assert().success();
    fs::write(
        dir.path().join(".toonflow/toonflow.toml"),
        "[pipeline]\nregeneration_delay_ms = 0\n",
    )
    .unwrap();
    dir
}

/// Helper to run the whole pipeline for a premise
fn run_pipeline(dir: &TempDir, premise: &str) {
    toonflow(dir)
        .args(["start", premise])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline complete"));
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_toonflow_help() {
        cargo_bin_cmd!("toonflow").arg("--help").assert().success();
    }

    #[test]
    fn test_toonflow_version() {
        cargo_bin_cmd!("toonflow").arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = TempDir::new().unwrap();

        toonflow(&dir)
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized toonflow project"));

        assert!(dir.path().join(".toonflow/toonflow.toml").exists());
        assert!(dir.path().join(".toonflow/state").exists());
        assert!(dir.path().join(".toonflow/audit/sessions").is_dir());
        assert!(dir.path().join(".toonflow/logs").is_dir());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = init_project();

        toonflow(&dir)
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_commands_require_init() {
        let dir = TempDir::new().unwrap();

        toonflow(&dir)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("toonflow init"));
    }

    #[test]
    fn test_invalid_phase_name() {
        let dir = init_project();

        toonflow(&dir)
            .args(["show", "Comic"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid phase"));
    }
}

// =============================================================================
// Pipeline Tests
// =============================================================================

mod pipeline {
    use super::*;

    #[test]
    fn test_start_runs_every_phase() {
        let dir = init_project();

        toonflow(&dir)
            .args(["start", "小兔子找胡萝卜"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Script confirmed"))
            .stdout(predicate::str::contains("Film confirmed"))
            .stdout(predicate::str::contains("Pipeline complete"));

        assert!(dir.path().join(".toonflow/session.json").exists());

        toonflow(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("complete (11/11)"));
    }

    #[test]
    fn test_start_twice_fails() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["start", "小狐狸"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already started"));
    }

    #[test]
    fn test_without_auto_next_halts_after_each_phase() {
        let dir = init_project();

        toonflow(&dir)
            .env("TOONFLOW_AUTO_NEXT", "off")
            .args(["start", "小兔子"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Script confirmed"))
            .stdout(predicate::str::contains("toonflow continue"))
            .stdout(predicate::str::contains("StoryBoard confirmed").not());

        toonflow(&dir)
            .env("TOONFLOW_AUTO_NEXT", "off")
            .arg("continue")
            .assert()
            .success()
            .stdout(predicate::str::contains("StoryBoard confirmed"))
            .stdout(predicate::str::contains("RoleDescription confirmed").not());
    }

    #[test]
    fn test_auto_command_persists() {
        let dir = init_project();

        toonflow(&dir)
            .args(["auto", "off"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Auto-advance off"));

        toonflow(&dir)
            .args(["start", "小兔子"])
            .assert()
            .success()
            .stdout(predicate::str::contains("StoryBoard confirmed").not());

        toonflow(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Auto-advance: off"))
            .stdout(predicate::str::contains("halted after Script"));
    }

    #[test]
    fn test_show_prints_current_content() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子找胡萝卜");

        toonflow(&dir)
            .args(["show", "Script"])
            .assert()
            .success()
            .stdout(predicate::str::contains("《小兔子找胡萝卜》"))
            .stdout(predicate::str::contains("version 1 of 1"));
    }

    #[test]
    fn test_retry_without_failure_fails() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .arg("retry")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Nothing to retry"));
    }

    #[test]
    fn test_retry_from_earlier_phase() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .env("TOONFLOW_AUTO_NEXT", "off")
            .args(["retry", "--from", "Tone"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Tone confirmed (version 2)"));

        toonflow(&dir)
            .arg("stale")
            .assert()
            .success()
            .stdout(predicate::str::contains("Audio"))
            .stdout(predicate::str::contains("Film"))
            .stdout(predicate::str::contains("after Tone edit"));

        toonflow(&dir).arg("flush").assert().success();

        toonflow(&dir)
            .arg("stale")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing is stale."));
    }

    #[test]
    fn test_reset_discards_progress() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["reset", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Reset complete"));

        toonflow(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("not started"));

        toonflow(&dir)
            .args(["start", "小狐狸"])
            .assert()
            .success();
    }
}

// =============================================================================
// Revision Tests
// =============================================================================

mod revisions {
    use super::*;

    #[test]
    fn test_script_edit_regenerates_dependents() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["edit", "Script", "--text", "《新故事》\n小狐狸的冒险"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Script saved (version 2)"))
            .stdout(predicate::str::contains("Stale:"))
            .stdout(predicate::str::contains("StoryBoard confirmed (version 2)"))
            .stdout(predicate::str::contains("Film confirmed (version 2)"));

        toonflow(&dir)
            .args(["show", "StoryBoard"])
            .assert()
            .success()
            .stdout(predicate::str::contains("《新故事》"));

        toonflow(&dir)
            .arg("stale")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing is stale."));
    }

    #[test]
    fn test_deferred_edit_waits_for_flush() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["edit", "Script", "--text", "《新故事》\n小狐狸", "--defer"])
            .assert()
            .success()
            .stdout(predicate::str::contains("toonflow flush"));

        toonflow(&dir)
            .arg("stale")
            .assert()
            .success()
            .stdout(predicate::str::contains("StoryBoard"))
            .stdout(predicate::str::contains("Queued regenerations"));

        toonflow(&dir)
            .arg("flush")
            .assert()
            .success()
            .stdout(predicate::str::contains("StoryBoard confirmed"));

        toonflow(&dir)
            .arg("flush")
            .assert()
            .success()
            .stdout(predicate::str::contains("No regenerations are queued."));
    }

    #[test]
    fn test_empty_edit_is_rejected() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["edit", "Script", "--text", "   "])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot be empty"));

        toonflow(&dir)
            .args(["show", "Script"])
            .assert()
            .success()
            .stdout(predicate::str::contains("version 1 of 1"));
    }

    #[test]
    fn test_edit_item_updates_one_description() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args([
                "edit-item",
                "RoleDescription",
                "0",
                "主角，一只戴帽子的兔子",
                "--defer",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("item 0 updated (version 2)"));

        toonflow(&dir)
            .args(["show", "RoleDescription"])
            .assert()
            .success()
            .stdout(predicate::str::contains("戴帽子的兔子"));
    }

    #[test]
    fn test_select_pins_candidate() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["select", "RoleImage", "0", "https://cdn.example/rabbit.png"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pinned"));

        toonflow(&dir)
            .args(["show", "RoleImage"])
            .assert()
            .success()
            .stdout(predicate::str::contains("https://cdn.example/rabbit.png"));
    }

    #[test]
    fn test_regenerate_phase() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["regenerate", "Tone"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Tone confirmed (version 2)"));
    }

    #[test]
    fn test_show_history_lists_versions() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["edit", "Script", "--text", "《第二版》\n正文", "--defer"])
            .assert()
            .success();

        toonflow(&dir)
            .args(["show", "Script", "--history"])
            .assert()
            .success()
            .stdout(predicate::str::contains("version 1"))
            .stdout(predicate::str::contains("version 2 (current)"))
            .stdout(predicate::str::contains("《第二版》"));
    }
}

// =============================================================================
// Session & Cache Tests
// =============================================================================

mod sessions {
    use super::*;

    #[test]
    fn test_same_session_resumes_cached_edit() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["edit", "Script", "--text", "《新故事》\n小狐狸", "--defer"])
            .assert()
            .success();

        toonflow(&dir)
            .args(["cache", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Resumed session"))
            .stdout(predicate::str::contains("script"))
            .stdout(predicate::str::contains("restorable"));
    }

    #[test]
    fn test_new_session_purges_cache_and_stale_flags() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["edit", "Script", "--text", "《新故事》\n小狐狸", "--defer"])
            .assert()
            .success();

        toonflow(&dir)
            .env("TOONFLOW_SESSION", "another-tab")
            .args(["cache", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("New session"))
            .stdout(predicate::str::contains("purged 1 cached edit(s)"));

        toonflow(&dir)
            .env("TOONFLOW_SESSION", "another-tab")
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("another-tab"))
            .stdout(predicate::str::contains("stale phase(s)").not());
    }

    #[test]
    fn test_cache_purge() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["edit", "Script", "--text", "《新故事》\n小狐狸", "--defer"])
            .assert()
            .success();

        toonflow(&dir)
            .args(["cache", "purge"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Purged 1 cached edit(s)"));

        toonflow(&dir)
            .args(["cache", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached edits."));
    }
}

// =============================================================================
// Generator Entry Point Tests
// =============================================================================

mod entry_points {
    use super::*;

    #[test]
    fn test_missing_generator_falls_back_to_outbox() {
        let dir = init_project();

        toonflow(&dir)
            .env("TOONFLOW_GENERATOR_CMD", "toonflow-generator-that-does-not-exist")
            .args(["start", "小兔子"])
            .assert()
            .success()
            .stdout(predicate::str::contains("sent as CONFIRMATION"))
            .stdout(predicate::str::contains("toonflow deliver Script"));

        let outbox = fs::read_to_string(dir.path().join(".toonflow/outbox")).unwrap();
        assert!(outbox.starts_with("CONFIRMATION "));

        toonflow(&dir)
            .env("TOONFLOW_GENERATOR_CMD", "toonflow-generator-that-does-not-exist")
            .args(["deliver", "Script", "--text", "《外部故事》\n正文"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Script confirmed"))
            .stdout(predicate::str::contains("GENERATE_STORYBOARD"));

        toonflow(&dir)
            .args(["show", "Script"])
            .assert()
            .success()
            .stdout(predicate::str::contains("《外部故事》"));
    }

    #[test]
    fn test_deliver_to_idle_phase_fails() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["deliver", "Tone", "--text", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("neither running nor stale"));
    }

    #[test]
    fn test_deliver_error_fails_running_phase() {
        let dir = init_project();

        toonflow(&dir)
            .env("TOONFLOW_GENERATOR_CMD", "toonflow-generator-that-does-not-exist")
            .args(["start", "小兔子"])
            .assert()
            .success();

        toonflow(&dir)
            .args(["deliver", "Script", "--error", "model overloaded"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Script failed: model overloaded"))
            .stdout(predicate::str::contains("toonflow retry"));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_generator_result_is_applied() {
        let dir = init_project();
        fs::write(
            dir.path().join(".toonflow/toonflow.toml"),
            r#"[pipeline]
auto_next = false
regeneration_delay_ms = 0

[generator]
command = "sh"
args = ["-c", 'cat >/dev/null; printf "%s" "{\"status\":\"success\",\"payload\":\"《外部故事》\"}"']
"#,
        )
        .unwrap();

        toonflow(&dir)
            .args(["start", "小兔子"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Script confirmed"));

        toonflow(&dir)
            .args(["show", "Script"])
            .assert()
            .success()
            .stdout(predicate::str::contains("《外部故事》"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_external_generator_fails_phase() {
        let dir = init_project();
        fs::write(
            dir.path().join(".toonflow/toonflow.toml"),
            r#"[generator]
command = "sh"
args = ["-c", "cat >/dev/null; echo boom >&2; exit 1"]
"#,
        )
        .unwrap();

        toonflow(&dir)
            .args(["start", "小兔子"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Script failed: boom"));

        toonflow(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Script failed"));
    }
}

// =============================================================================
// Audit & Config Tests
// =============================================================================

mod audit_and_config {
    use super::*;

    #[test]
    fn test_audit_show_lists_revisions() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir)
            .args(["edit", "Script", "--text", "《新故事》\n小狐狸", "--defer"])
            .assert()
            .success();

        toonflow(&dir)
            .args(["audit", "show", "Script"])
            .assert()
            .success()
            .stdout(predicate::str::contains("generated"))
            .stdout(predicate::str::contains("edited"))
            .stdout(predicate::str::contains("stale: StoryBoard"));
    }

    #[test]
    fn test_audit_export_writes_json() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");
        let output = dir.path().join("audit.json");

        toonflow(&dir)
            .args(["audit", "export"])
            .arg(&output)
            .assert()
            .success()
            .stdout(predicate::str::contains("Exported 11 event(s)"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(json["events"].as_array().unwrap().len(), 11);
    }

    #[test]
    fn test_reset_archives_audit_session() {
        let dir = init_project();
        run_pipeline(&dir, "小兔子");

        toonflow(&dir).args(["reset", "--force"]).assert().success();

        toonflow(&dir)
            .args(["audit", "sessions"])
            .assert()
            .success()
            .stdout(predicate::str::contains("11 event(s)"));
    }

    #[test]
    fn test_config_show_and_validate() {
        let dir = init_project();

        toonflow(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("regeneration_delay_ms = 0"))
            .stdout(predicate::str::contains("command = (offline)"));

        toonflow(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = init_project();
        fs::write(
            dir.path().join(".toonflow/toonflow.toml"),
            "[cache]\nsimilarity_threshold = 2.0\n",
        )
        .unwrap();

        toonflow(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("similarity_threshold"));
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = init_project();

        toonflow(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }
}
