use async_trait::async_trait;
use rustf_migrations::{
    HistoryOptions, MergeOptions, MetadataProvider, MetadataTarget, Migrations, MigrationsConfig,
    OutputSink, Result, RevisionOptions, SchemaDiff, ScriptEngine,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    out: OutputSink,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            out: OutputSink::buffer(),
        }
    }

    fn script_location(&self) -> PathBuf {
        self.dir.path().join("migrations")
    }

    fn versions(&self) -> PathBuf {
        self.script_location().join("versions")
    }

    fn database(&self) -> PathBuf {
        self.dir.path().join("app.db")
    }

    fn config(&self) -> MigrationsConfig {
        MigrationsConfig::default()
            .with_script_location(self.script_location())
            .with_database_url(format!("sqlite://{}?mode=rwc", self.database().display()))
            .with_output(self.out.clone())
    }

    fn migrations(&self) -> Migrations {
        Migrations::new(self.config())
    }

    fn output(&self) -> String {
        self.out.contents().unwrap()
    }

    fn write_revision(&self, id: &str, parent: &str, upgrade: &str, downgrade: &str) -> PathBuf {
        let path = self.versions().join(format!("{}.sql", id));
        fs::write(
            &path,
            format!(
                "-- revision {id}\n--\n-- Revision ID: {id}\n-- Revises: {parent}\n\
                 -- Create Date: 2025-01-04 12:30:45.000000\n\n\
                 -- upgrade\n{upgrade}\n\n-- downgrade\n{downgrade}\n"
            ),
        )
        .unwrap();
        path
    }

    /// Environment with two revisions creating tables
    async fn with_tables(&self) -> Migrations {
        let migrations = self.migrations();
        migrations.init(false).await.unwrap();
        self.write_revision(
            "a1",
            "",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(255) NOT NULL);",
            "DROP TABLE users;",
        );
        self.write_revision(
            "b2",
            "a1",
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL);",
            "DROP TABLE posts;",
        );
        migrations
    }
}

fn revisions(scripts: &[rustf_migrations::Script]) -> Vec<&str> {
    scripts.iter().map(|s| s.revision.as_str()).collect()
}

#[tokio::test]
async fn test_init_creates_environment() {
    let ws = Workspace::new();
    let migrations = ws.migrations();

    let created = migrations.init(false).await.unwrap();
    assert_eq!(created, ws.script_location());

    let location = ws.script_location();
    for file in ["migrations.toml", "env.sql", "README", "script.sql.hbs"] {
        assert!(location.join(file).is_file(), "missing {}", file);
    }
    assert!(!location.join("settings.toml.tmpl").exists());
    assert_eq!(fs::read_dir(ws.versions()).unwrap().count(), 0);

    let settings = fs::read_to_string(location.join("migrations.toml")).unwrap();
    let settings: toml::Table = toml::from_str(&settings).unwrap();
    assert_eq!(
        settings.get("script_location").and_then(|v| v.as_str()),
        Some(location.display().to_string().as_str())
    );

    let output = ws.output();
    assert!(output.contains("Creating directory"));
    assert!(output.contains("Please edit configuration/connection settings"));
}

#[tokio::test]
async fn test_init_quotes_script_location() {
    let ws = Workspace::new();
    let location = ws.dir.path().join("o'brien migrations");
    let migrations = Migrations::new(ws.config().with_script_location(&location));
    migrations.init(false).await.unwrap();

    let settings = fs::read_to_string(location.join("migrations.toml")).unwrap();
    let settings: toml::Table = toml::from_str(&settings).unwrap();
    assert_eq!(
        settings.get("script_location").and_then(|v| v.as_str()),
        Some(location.display().to_string().as_str())
    );

    let script = migrations
        .revision(RevisionOptions::new().message("first"))
        .await
        .unwrap();
    let heads = migrations.heads(false, false).await.unwrap();
    assert_eq!(revisions(&heads), vec![script.revision.as_str()]);
}

#[tokio::test]
async fn test_init_refuses_existing_directory() {
    let ws = Workspace::new();
    let migrations = ws.migrations();
    migrations.init(false).await.unwrap();

    let readme = ws.script_location().join("README");
    fs::write(&readme, "local notes").unwrap();

    let err = migrations.init(false).await.unwrap_err();
    assert!(err.is_command());
    assert!(err.to_string().contains("already exists"));
    assert_eq!(fs::read_to_string(&readme).unwrap(), "local notes");
}

#[tokio::test]
async fn test_async_template_runs_each_revision_in_its_own_transaction() {
    let ws = Workspace::new();
    let migrations = Migrations::new(ws.config().with_async_database(true));
    migrations.init(false).await.unwrap();

    let settings = fs::read_to_string(ws.script_location().join("migrations.toml")).unwrap();
    assert!(settings.contains("transaction_per_migration = true"));

    ws.write_revision("a1", "", "CREATE TABLE users (id INTEGER);", "DROP TABLE users;");
    ws.write_revision("b2", "a1", "CREATE TABLE posts (id INTEGER);", "DROP TABLE posts;");
    migrations.upgrade("head", true, None).await.unwrap();

    let output = ws.output();
    assert_eq!(output.matches("BEGIN;").count(), 2);
    assert_eq!(output.matches("COMMIT;").count(), 2);
}

#[tokio::test]
async fn test_commands_before_init_fail() {
    let ws = Workspace::new();
    let err = ws.migrations().heads(false, false).await.unwrap_err();
    assert!(err.is_command());
    assert!(err.to_string().contains("Please use the 'init' command"));
}

#[tokio::test]
async fn test_revision_chain() {
    let ws = Workspace::new();
    let migrations = ws.migrations();
    migrations.init(false).await.unwrap();

    let first = migrations
        .revision(RevisionOptions::new().message("add users table").rev_id("a1"))
        .await
        .unwrap();
    assert_eq!(first.revision, "a1");
    assert!(first.is_base());
    assert_eq!(first.doc(), "add users table");
    assert_eq!(first.path, ws.versions().join("a1.sql"));

    let content = fs::read_to_string(&first.path).unwrap();
    assert!(content.starts_with("-- add users table"));
    assert!(content.contains("-- Revision ID: a1"));
    assert!(content.contains("-- upgrade"));
    assert!(content.contains("-- downgrade"));

    let second = migrations
        .revision(RevisionOptions::new().rev_id("b2"))
        .await
        .unwrap();
    assert_eq!(second.down_revisions, vec!["a1".to_string()]);
    assert_eq!(second.doc(), "empty message");

    let err = migrations
        .revision(RevisionOptions::new().rev_id("a1"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already present"));

    let err = migrations
        .revision(RevisionOptions::new().head("a1").rev_id("c3"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("--splice"));

    let err = migrations
        .revision(RevisionOptions::new().sql(true).autogenerate(true))
        .await
        .unwrap_err();
    assert!(err.is_command());
}

#[tokio::test]
async fn test_revision_generated_id() {
    let ws = Workspace::new();
    let migrations = ws.migrations();
    migrations.init(false).await.unwrap();

    let script = migrations
        .revision(RevisionOptions::new().message("add users table"))
        .await
        .unwrap();

    assert_eq!(fs::read_dir(ws.versions()).unwrap().count(), 1);
    assert_eq!(script.revision.len(), 12);
    assert!(script.revision.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(script.doc(), "add users table");
    assert_eq!(script.path, ws.versions().join(format!("{}.sql", script.revision)));

    let heads = migrations.heads(false, false).await.unwrap();
    assert_eq!(revisions(&heads), vec![script.revision.as_str()]);
}

#[tokio::test]
async fn test_revision_message_shaped_like_header() {
    let ws = Workspace::new();
    let migrations = ws.migrations();
    migrations.init(false).await.unwrap();

    let messages = ["upgrade accounts", "downgrade", "Revises: x", "upgrade"];
    let mut created = Vec::new();
    for message in messages {
        let script = migrations
            .revision(RevisionOptions::new().message(message))
            .await
            .unwrap();
        assert_eq!(script.doc(), message);
        created.push(script.revision);
    }

    assert_eq!(fs::read_dir(ws.versions()).unwrap().count(), messages.len());
    let heads = migrations.heads(false, false).await.unwrap();
    assert_eq!(revisions(&heads), vec![created[3].as_str()]);

    let history = migrations.history(HistoryOptions::new()).await.unwrap();
    assert_eq!(history.len(), messages.len());
    for script in &history {
        let position = created.iter().position(|id| *id == script.revision).unwrap();
        assert_eq!(script.doc(), messages[position]);
    }
}

#[tokio::test]
async fn test_revision_with_broken_template_writes_nothing() {
    let ws = Workspace::new();
    let migrations = ws.migrations();
    migrations.init(false).await.unwrap();
    fs::write(ws.script_location().join("script.sql.hbs"), "-- {{message}}\n").unwrap();

    let err = migrations
        .revision(RevisionOptions::new().message("add users table"))
        .await
        .unwrap_err();
    assert!(err.is_command());
    assert_eq!(fs::read_dir(ws.versions()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_file_template_and_branch_labels() {
    let ws = Workspace::new();
    let migrations =
        Migrations::new(ws.config().with_file_template("%(rev)s_%(slug)s"));
    migrations.init(false).await.unwrap();

    let script = migrations
        .revision(
            RevisionOptions::new()
                .message("Add users table!")
                .rev_id("a1")
                .branch_label("accounts"),
        )
        .await
        .unwrap();
    assert_eq!(script.path, ws.versions().join("a1_add_users_table.sql"));
    assert_eq!(script.branch_labels, vec!["accounts".to_string()]);

    let err = migrations
        .revision(RevisionOptions::new().rev_id("b2").branch_label("accounts"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already used by revision a1"));

    let child = migrations
        .revision(RevisionOptions::new().head("accounts@head").rev_id("b2"))
        .await
        .unwrap();
    assert_eq!(child.down_revisions, vec!["a1".to_string()]);
}

#[tokio::test]
async fn test_branches_heads_and_merge() {
    let ws = Workspace::new();
    let migrations = ws.migrations();
    migrations.init(false).await.unwrap();

    migrations
        .revision(RevisionOptions::new().message("base").rev_id("a1"))
        .await
        .unwrap();
    migrations
        .revision(RevisionOptions::new().message("left").rev_id("b2"))
        .await
        .unwrap();
    migrations
        .revision(
            RevisionOptions::new()
                .message("right")
                .head("a1")
                .splice(true)
                .rev_id("c3"),
        )
        .await
        .unwrap();

    let mut heads = revisions(&migrations.heads(false, false).await.unwrap())
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    heads.sort();
    assert_eq!(heads, vec!["b2".to_string(), "c3".to_string()]);

    let err = migrations
        .revision(RevisionOptions::new().rev_id("d4"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Multiple head revisions"));

    let branches = migrations.branches(false).await.unwrap();
    assert_eq!(revisions(&branches), vec!["a1"]);
    assert!(ws.output().contains("a1 (branchpoint)"));

    let err = migrations
        .merge(MergeOptions::new(["b2"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("at least two revisions"));

    let merged = migrations
        .merge(MergeOptions::new(["heads"]).message("join").rev_id("m1"))
        .await
        .unwrap();
    let mut parents = merged.down_revisions.clone();
    parents.sort();
    assert_eq!(parents, vec!["b2".to_string(), "c3".to_string()]);
    assert!(merged.is_merge_point());

    let heads = migrations.heads(false, false).await.unwrap();
    assert_eq!(revisions(&heads), vec!["m1"]);
}

#[tokio::test]
async fn test_history_listing() {
    let ws = Workspace::new();
    let migrations = ws.with_tables().await;

    let listed = migrations.history(HistoryOptions::new()).await.unwrap();
    assert_eq!(revisions(&listed), vec!["b2", "a1"]);

    let output = ws.output();
    assert!(output.contains("<base> -> a1, revision a1"));
    assert!(output.contains("a1 -> b2 (head), revision b2"));

    let ranged = migrations
        .history(HistoryOptions::new().rev_range("b2:"))
        .await
        .unwrap();
    assert_eq!(revisions(&ranged), vec!["b2"]);

    let err = migrations
        .history(HistoryOptions::new().rev_range("b2"))
        .await
        .unwrap_err();
    assert!(err.is_command());
}

#[tokio::test]
async fn test_offline_upgrade_writes_sql() {
    let ws = Workspace::new();
    let migrations = ws.with_tables().await;

    let steps = migrations.upgrade("head", true, None).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].to_string(), "Running upgrade a1 -> b2");

    let output = ws.output();
    assert!(output.contains("CREATE TABLE IF NOT EXISTS schema_version"));
    assert!(output.contains("BEGIN;"));
    assert!(output.contains("CREATE TABLE users"));
    assert!(output.contains("INSERT INTO schema_version (version_num) VALUES ('a1');"));
    assert!(output.contains("DELETE FROM schema_version WHERE version_num = 'a1';"));
    assert!(output.contains("INSERT INTO schema_version (version_num) VALUES ('b2');"));
    assert!(output.trim_end().ends_with("COMMIT;"));
    assert!(!ws.database().exists());
}

#[tokio::test]
async fn test_offline_downgrade_needs_a_range() {
    let ws = Workspace::new();
    let migrations = ws.with_tables().await;

    // the default target is rewritten to head:-1 in SQL mode
    let steps = migrations.downgrade("-1", true, None).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].to_string(), "Running downgrade b2 -> a1");
    assert!(ws.output().contains("DROP TABLE posts;"));
    assert!(!ws.output().contains("DROP TABLE users;"));

    let err = migrations.downgrade("a1", true, None).await.unwrap_err();
    assert!(err.to_string().contains("<fromrev>:<torev>"));

    let err = migrations.upgrade("a1:b2", false, None).await.unwrap_err();
    assert!(err.to_string().contains("only allowed with --sql"));
    assert!(!ws.database().exists());
}

#[tokio::test]
async fn test_online_upgrade_and_downgrade() {
    let ws = Workspace::new();
    let migrations = ws.with_tables().await;

    assert!(migrations.current(false, false).await.unwrap().is_empty());

    let steps = migrations.upgrade("head", false, None).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert!(ws.database().exists());
    assert_eq!(
        revisions(&migrations.current(false, false).await.unwrap()),
        vec!["b2"]
    );

    // already at head
    assert!(migrations.upgrade("head", false, None).await.unwrap().is_empty());

    let steps = migrations.downgrade("-1", false, None).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(
        revisions(&migrations.current(false, false).await.unwrap()),
        vec!["a1"]
    );

    // posts was dropped, so upgrading again creates it without error
    migrations.upgrade("+1", false, None).await.unwrap();
    assert_eq!(
        revisions(&migrations.current(false, false).await.unwrap()),
        vec!["b2"]
    );

    migrations.downgrade("base", false, None).await.unwrap();
    assert!(migrations.current(false, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_current_head_only_output() {
    let ws = Workspace::new();
    let migrations = ws.with_tables().await;
    migrations.upgrade("a1", false, None).await.unwrap();

    migrations.current(false, true).await.unwrap();
    assert!(ws.output().lines().any(|line| line == "a1"));

    migrations
        .history(HistoryOptions::new().indicate_current(true))
        .await
        .unwrap();
    assert!(ws.output().contains("<base> -> a1 (current), revision a1"));
}

#[tokio::test]
async fn test_stamp() {
    let ws = Workspace::new();
    let migrations = ws.with_tables().await;

    migrations.stamp("head", false, None).await.unwrap();
    assert_eq!(
        revisions(&migrations.current(false, false).await.unwrap()),
        vec!["b2"]
    );
    // nothing left to run after stamping
    assert!(migrations.upgrade("head", false, None).await.unwrap().is_empty());

    migrations.stamp("base", false, None).await.unwrap();
    assert!(migrations.current(false, false).await.unwrap().is_empty());

    migrations.stamp("a1", true, None).await.unwrap();
    let output = ws.output();
    assert!(output.contains("DELETE FROM schema_version;"));
    assert!(output.contains("INSERT INTO schema_version (version_num) VALUES ('a1');"));
}

#[tokio::test]
async fn test_version_table_option() {
    let ws = Workspace::new();
    let migrations = Migrations::new(ws.config().with_option("version_table", "app_versions"));
    migrations.init(false).await.unwrap();
    ws.write_revision("a1", "", "CREATE TABLE users (id INTEGER);", "DROP TABLE users;");

    migrations.upgrade("head", true, None).await.unwrap();
    assert!(ws
        .output()
        .contains("INSERT INTO app_versions (version_num) VALUES ('a1');"));
}

#[tokio::test]
async fn test_show() {
    let ws = Workspace::new();
    let migrations = ws.with_tables().await;

    let shown = migrations.show("head").await.unwrap();
    assert_eq!(revisions(&shown), vec!["b2"]);

    let output = ws.output();
    assert!(output.contains("Rev: b2 (head)"));
    assert!(output.contains("Parent: a1"));

    assert!(migrations.show("zz").await.unwrap_err().is_command());
}

#[tokio::test]
async fn test_multidb_environment() {
    let ws = Workspace::new();
    let migrations = ws.migrations();
    migrations.init(true).await.unwrap();

    let script = migrations
        .revision(RevisionOptions::new().message("split").rev_id("a1"))
        .await
        .unwrap();
    let content = fs::read_to_string(&script.path).unwrap();
    assert!(content.contains("-- upgrade engine1"));
    assert!(content.contains("-- downgrade engine2"));

    fs::write(
        &script.path,
        "-- split\n--\n-- Revision ID: a1\n-- Revises:\n\n\
         -- upgrade\nCREATE TABLE shared (id INTEGER);\n\n\
         -- upgrade engine1\nCREATE TABLE users (id INTEGER);\n\n\
         -- upgrade engine2\nCREATE TABLE events (id INTEGER);\n\n\
         -- downgrade\nDROP TABLE shared;\n",
    )
    .unwrap();

    migrations.upgrade("head", true, None).await.unwrap();
    let output = ws.output();
    let engine1 = output.find("-- database: engine1").unwrap();
    let engine2 = output.find("-- database: engine2").unwrap();
    assert!(engine1 < engine2);

    let (first, second) = output.split_at(engine2);
    assert!(first[engine1..].contains("CREATE TABLE users"));
    assert!(!first[engine1..].contains("CREATE TABLE events"));
    assert!(second.contains("CREATE TABLE events"));
    assert!(second.contains("CREATE TABLE shared"));
}

struct StubProvider;

#[async_trait]
impl MetadataProvider for StubProvider {
    async fn diff(&self, target: &MetadataTarget, _database_url: &str) -> Result<SchemaDiff> {
        assert_eq!(target.package.as_deref(), Some("app.models"));
        Ok(SchemaDiff {
            upgrade: "CREATE TABLE audit (id INTEGER);".to_string(),
            downgrade: "DROP TABLE audit;".to_string(),
        })
    }
}

#[tokio::test]
async fn test_autogenerate_with_provider() {
    let ws = Workspace::new();
    let config = ws.config().with_metadata("app.models", "Base");
    let engine = ScriptEngine::new().with_metadata_provider(StubProvider);
    let migrations = Migrations::with_engine(config, engine);
    migrations.init(false).await.unwrap();

    let script = migrations
        .autogenerate(RevisionOptions::new().message("audit").rev_id("g1"))
        .await
        .unwrap();
    let content = fs::read_to_string(&script.path).unwrap();
    assert!(content.contains("CREATE TABLE audit (id INTEGER);"));
    assert!(content.contains("DROP TABLE audit;"));

    // g1 is not applied yet
    let err = migrations
        .autogenerate(RevisionOptions::new().rev_id("h2"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Target database is not up to date.");

    migrations.upgrade("head", false, None).await.unwrap();
    migrations
        .autogenerate(RevisionOptions::new().rev_id("h2"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_autogenerate_without_provider() {
    let ws = Workspace::new();
    let migrations = ws.migrations();
    migrations.init(false).await.unwrap();

    let err = migrations
        .autogenerate(RevisionOptions::new().rev_id("g1"))
        .await
        .unwrap_err();
    assert!(err.is_command());
    assert!(err.to_string().contains("metadata provider"));
    assert!(!ws.versions().join("g1.sql").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_edit_runs_configured_editor() {
    let ws = Workspace::new();
    ws.migrations().init(false).await.unwrap();
    ws.write_revision("a1", "", "SELECT 1;", "SELECT 1;");

    let editing = Migrations::new(ws.config().with_option("editor", "true"));
    editing.edit("a1").await.unwrap();

    let failing = Migrations::new(ws.config().with_option("editor", "false"));
    let err = failing.edit("a1").await.unwrap_err();
    assert!(err.is_command());

    // the database is empty, so there is no current revision to open
    let err = editing.edit("current").await.unwrap_err();
    assert!(err.to_string().contains("'current'"));
}
