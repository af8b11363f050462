extern crate assert_cmd;
extern crate predicates;
extern crate tempfile;

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn main_cmd() -> Command {
        Command::cargo_bin("main").unwrap()
    }

    fn db_path(dir: &TempDir) -> String {
        dir.path().join("tracker.db").to_str().unwrap().to_string()
    }

    fn create_file(dir: &TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();

        path.to_str().unwrap().to_string()
    }

    fn cmd_success(dir: &TempDir, args: Vec<&str>) {
        main_cmd().arg(db_path(dir)).args(args).assert().success();
    }

    fn cmd_should_print(dir: &TempDir, args: Vec<&str>, expected: &str) {
        let expected = expected.to_string();
        main_cmd()
            .arg(db_path(dir))
            .args(args)
            .assert()
            .success()
            .stdout(predicate::function(move |output: &str| {
                output.contains(&expected)
            }));
    }

    #[test]
    fn add_and_inspect_file_history() {
        let dir = tempfile::tempdir().unwrap();
        cmd_success(&dir, vec!["init"]);

        let rock = create_file(&dir, "rock.entity", "rock data");
        cmd_success(&dir, vec!["add", &rock, "--user", "alice"]);

        cmd_should_print(&dir, vec!["history", &rock], "Insert by alice");

        cmd_success(&dir, vec!["rm", &rock, "--user", "bob"]);
        cmd_should_print(&dir, vec!["history", &rock], "Delete by bob");
    }

    #[test]
    fn adding_the_same_path_twice_resolves_to_one_identity() {
        let dir = tempfile::tempdir().unwrap();
        cmd_success(&dir, vec!["init"]);

        let rock = create_file(&dir, "rock.entity", "rock data");
        cmd_success(&dir, vec!["add", &rock]);
        // The second add mints a different id, which must end up as an
        // alias of the first instead of a second record.
        cmd_should_print(&dir, vec!["add", &rock], "already tracked");
    }

    #[test]
    fn move_renames_and_keeps_the_old_path_in_history() {
        let dir = tempfile::tempdir().unwrap();
        cmd_success(&dir, vec!["init"]);

        let rock = create_file(&dir, "rock.entity", "rock data");
        let boulder = create_file(&dir, "boulder.entity", "rock data");
        cmd_success(&dir, vec!["add", &rock]);

        cmd_success(&dir, vec!["move", &rock, &boulder]);
        cmd_should_print(&dir, vec!["history", &boulder], "Update by");
        cmd_should_print(&dir, vec!["history", &boulder], &rock);
    }

    #[test]
    fn track_and_search_assets() {
        let dir = tempfile::tempdir().unwrap();
        cmd_success(&dir, vec!["init"]);

        let rock = create_file(&dir, "rock.entity", "rock data");
        let moss = create_file(&dir, "moss.shader", "shader data");
        cmd_success(&dir, vec!["add", &rock, "--user", "alice"]);
        cmd_success(&dir, vec!["add", &moss, "--user", "alice"]);

        cmd_should_print(&dir, vec!["track"], "Index pass complete (2/2 files)");

        cmd_should_print(&dir, vec!["search", "rock"], &rock);
        cmd_should_print(&dir, vec!["search", "rock"], "1 matching assets");
        cmd_should_print(&dir, vec!["search", "file_type:shader"], &moss);
        cmd_should_print(&dir, vec!["search", "no_such_thing"], "0 matching assets");
    }

    #[test]
    fn optimize_runs_on_an_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        cmd_success(&dir, vec!["init"]);
        cmd_success(&dir, vec!["optimize"]);
    }
}
