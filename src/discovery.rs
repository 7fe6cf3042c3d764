//! Script migrations discovered from a directory.
//!
//! ```text
//! migrations/
//! ├── 20260101093000-create-users.yaml
//! └── 20260102110000-add-email-index.yaml
//! ```
//!
//! Each file holds an optional `description` and the `up`/`down` shell
//! commands. The file stem is the migration title.

use async_trait::async_trait;
use rsmigrate_core::{Direction, Migration, MigrationSet, StepError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// On-disk migration definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub up: String,
    #[serde(default)]
    pub down: String,
}

/// Errors while discovering migrations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read migrations from '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid migration definition '{}': {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("migration file name '{}' is not valid UTF-8", .0.display())]
    InvalidName(PathBuf),
}

/// Errors while creating a migration definition.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("migration name '{0}' has no usable characters")]
    EmptyName(String),

    #[error("migration file '{}' already exists", .0.display())]
    Exists(PathBuf),

    #[error("failed to write '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to encode migration template: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// A step command exiting unsuccessfully.
#[derive(Debug)]
pub struct ScriptFailure {
    pub command: String,
    pub status: std::process::ExitStatus,
    pub stderr: String,
}

impl std::fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' exited with {}", self.command, self.status)?;
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptFailure {}

/// Migration running shell commands.
#[derive(Debug, Clone)]
pub struct ScriptMigration {
    title: String,
    description: Option<String>,
    up: String,
    down: String,
    shell: String,
    workdir: PathBuf,
}

impl ScriptMigration {
    pub fn new(
        title: impl Into<String>,
        file: MigrationFile,
        shell: impl Into<String>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            title: title.into(),
            description: file.description,
            up: file.up,
            down: file.down,
            shell: shell.into(),
            workdir: workdir.into(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn command(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    /// Runs the command for `direction`, echoing its stdout, and returns the
    /// captured stdout.
    async fn execute(&self, direction: Direction) -> Result<String, StepError> {
        let command = self.command(direction);
        if command.trim().is_empty() {
            tracing::debug!("{} has no {} command, skipping", self.title, direction);
            return Ok(String::new());
        }

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .env("RSMIGRATE_TITLE", &self.title)
            .env("RSMIGRATE_DIRECTION", direction.as_str())
            .stdin(Stdio::null())
            .output()
            .await?;

        // Printed directly so it shows under the default log filter
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        for line in output_lines(&self.title, &stdout) {
            println!("{}", line);
        }

        if !output.status.success() {
            return Err(Box::new(ScriptFailure {
                command: command.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }));
        }

        Ok(stdout)
    }
}

/// Prefixes each non-blank stdout line with the migration title.
fn output_lines(title: &str, stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("       [{}] {}", title, line))
        .collect()
}

#[async_trait]
impl Migration for ScriptMigration {
    fn title(&self) -> &str {
        &self.title
    }

    async fn up(&self) -> Result<(), StepError> {
        self.execute(Direction::Up).await.map(|_| ())
    }

    async fn down(&self) -> Result<(), StepError> {
        self.execute(Direction::Down).await.map(|_| ())
    }
}

fn is_definition(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Loads every definition in `dir`, ordered by file name.
pub fn discover(dir: &Path, shell: &str) -> Result<Vec<ScriptMigration>, DiscoveryError> {
    let io_err = |e| DiscoveryError::Io(dir.to_path_buf(), e);

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_definition(&path) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut migrations = Vec::with_capacity(paths.len());
    for path in paths {
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DiscoveryError::InvalidName(path.clone()))?
            .to_string();

        let content =
            std::fs::read_to_string(&path).map_err(|e| DiscoveryError::Io(path.clone(), e))?;
        let file: MigrationFile = if content.trim().is_empty() {
            MigrationFile::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| DiscoveryError::Parse(path.clone(), e))?
        };

        tracing::debug!("Discovered migration {}", title);
        migrations.push(ScriptMigration::new(title, file, shell, dir));
    }

    Ok(migrations)
}

/// Builds the registry for `storage_key` from the definitions in `dir`.
pub fn load_set(
    dir: &Path,
    shell: &str,
    storage_key: &str,
) -> Result<MigrationSet, DiscoveryError> {
    let mut set = MigrationSet::new(storage_key);
    for migration in discover(dir, shell)? {
        set.register(migration);
    }
    Ok(set)
}

/// Lowercases `name` and joins its alphanumeric runs with dashes.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// Writes an empty definition named `<timestamp>-<slug>.yaml` into `dir`.
pub fn create(dir: &Path, name: &str, timestamp: &str) -> Result<PathBuf, CreateError> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(CreateError::EmptyName(name.to_string()));
    }

    std::fs::create_dir_all(dir).map_err(|e| CreateError::Io(dir.to_path_buf(), e))?;

    let path = dir.join(format!("{}-{}.yaml", timestamp, slug));
    let template = serde_yaml::to_string(&MigrationFile {
        description: Some(name.to_string()),
        ..Default::default()
    })?;

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(CreateError::Exists(path));
        }
        Err(e) => return Err(CreateError::Io(path, e)),
    };
    std::io::Write::write_all(&mut file, template.as_bytes())
        .map_err(|e| CreateError::Io(path.clone(), e))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_discovery_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "003-c.yaml", "up: 'true'\ndown: 'true'\n");
        write(dir.path(), "001-a.yml", "up: 'true'\ndown: 'true'\n");
        write(dir.path(), "002-b.yaml", "description: second\nup: 'true'\n");
        write(dir.path(), "README.md", "not a migration");
        std::fs::create_dir(dir.path().join("004-dir.yaml")).unwrap();

        let migrations = discover(dir.path(), "sh").unwrap();
        let titles: Vec<&str> = migrations.iter().map(|m| m.title()).collect();
        assert_eq!(titles, vec!["001-a", "002-b", "003-c"]);
        assert_eq!(migrations[1].description(), Some("second"));
        assert_eq!(migrations[1].command(Direction::Down), "");
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001-bad.yaml", "up: [unterminated");

        let err = discover(dir.path(), "sh").unwrap_err();
        assert!(matches!(err, DiscoveryError::Parse(..)));
        assert!(err.to_string().contains("001-bad.yaml"));
    }

    #[test]
    fn test_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = discover(&dir.path().join("absent"), "sh").unwrap_err();
        assert!(matches!(err, DiscoveryError::Io(..)));
    }

    #[test]
    fn test_load_set() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "002.yaml", "");
        write(dir.path(), "001.yaml", "");

        let set = load_set(dir.path(), "sh", "proj").unwrap();
        assert_eq!(set.titles(), vec!["001", "002"]);
        assert_eq!(set.storage_key(), "proj");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_environment() {
        let dir = TempDir::new().unwrap();
        let file = MigrationFile {
            description: None,
            up: "echo \"$RSMIGRATE_TITLE:$RSMIGRATE_DIRECTION\" > out.txt".into(),
            down: "rm out.txt".into(),
        };
        let migration = ScriptMigration::new("001-env", file, "sh", dir.path());

        migration.up().await.unwrap();
        let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "001-env:up");

        migration.run(Direction::Down).await.unwrap();
        assert!(!dir.path().join("out.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_failure() {
        let dir = TempDir::new().unwrap();
        let file = MigrationFile {
            description: None,
            up: "echo broken >&2; exit 3".into(),
            down: String::new(),
        };
        let migration = ScriptMigration::new("001-fail", file, "sh", dir.path());

        let err = migration.up().await.unwrap_err();
        let failure = err.downcast_ref::<ScriptFailure>().unwrap();
        assert_eq!(failure.status.code(), Some(3));
        assert!(err.to_string().ends_with(": broken"));

        migration.down().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_output_is_echoed() {
        let dir = TempDir::new().unwrap();
        let file = MigrationFile {
            description: None,
            up: "echo created users; echo; echo 3 rows".into(),
            down: String::new(),
        };
        let migration = ScriptMigration::new("001-out", file, "sh", dir.path());

        let stdout = migration.execute(Direction::Up).await.unwrap();
        assert_eq!(
            output_lines(migration.title(), &stdout),
            vec![
                "       [001-out] created users".to_string(),
                "       [001-out] 3 rows".to_string(),
            ]
        );
        assert_eq!(migration.execute(Direction::Down).await.unwrap(), "");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Create Users"), "create-users");
        assert_eq!(slugify("  add__email/index "), "add-email-index");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_create_template() {
        let dir = TempDir::new().unwrap();
        let migrations = dir.path().join("migrations");

        let path = create(&migrations, "Create Users", "20260101093000").unwrap();
        assert_eq!(path, migrations.join("20260101093000-create-users.yaml"));

        let found = discover(&migrations, "sh").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title(), "20260101093000-create-users");
        assert_eq!(found[0].description(), Some("Create Users"));
        assert_eq!(found[0].command(Direction::Up), "");
    }

    #[test]
    fn test_create_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), "users", "20260101093000").unwrap();

        let err = create(dir.path(), "users", "20260101093000").unwrap_err();
        assert!(matches!(err, CreateError::Exists(_)));
        assert!(matches!(
            create(dir.path(), "--", "20260101093000"),
            Err(CreateError::EmptyName(_))
        ));
    }
}
