use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use time::Date;

use crate::app::App;
use crate::config::{AppConfig, SourceConfig, SourceKind};
use crate::source::{self, FileSource, GoalSource, GraphQlSource, UserSummary};
use crate::timeline::filter::{self, parse_bound};
use crate::timeline::{
    project, sort_entries, FilterState, SpacingRules, TimelineEntry, YearFilter,
};
use crate::viewport::VisibilitySignal;

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only goals from this year ("All" for every year)
    #[arg(long)]
    pub year: Option<YearFilter>,
    /// Earliest day to include (YYYY-MM-DD, inclusive)
    #[arg(long, value_parser = parse_bound)]
    pub from: Option<Date>,
    /// Latest day to include (YYYY-MM-DD, inclusive)
    #[arg(long, value_parser = parse_bound)]
    pub to: Option<Date>,
    /// Show the spacing between neighbouring goals
    #[arg(long)]
    pub spacing: bool,
}

impl ListArgs {
    fn filter_state(&self) -> FilterState {
        FilterState {
            year: self.year.unwrap_or_default(),
            start: self.from,
            end: self.to,
        }
    }
}

/// Command-line choices that take precedence over `[source]` in the config.
#[derive(Debug, Clone, Default)]
pub struct SourceOverride {
    pub endpoint: Option<String>,
    pub file: Option<PathBuf>,
}

pub fn build_source(cfg: &SourceConfig, overrides: &SourceOverride) -> Result<Box<dyn GoalSource>> {
    if let Some(path) = &overrides.file {
        return Ok(Box::new(FileSource::new(path.clone())));
    }
    if let Some(endpoint) = &overrides.endpoint {
        let source = GraphQlSource::new(endpoint.clone(), cfg.timeout())
            .context("building GraphQL client")?;
        return Ok(Box::new(source));
    }
    match cfg.kind {
        SourceKind::Graphql => {
            let source = GraphQlSource::new(cfg.endpoint.clone(), cfg.timeout())
                .context("building GraphQL client")?;
            Ok(Box::new(source))
        }
        SourceKind::File => match &cfg.file {
            Some(path) => Ok(Box::new(FileSource::new(path.clone()))),
            None => bail!("source.kind = \"file\" needs source.file (or pass --file)"),
        },
    }
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn list_goals(
    config: &AppConfig,
    source: &dyn GoalSource,
    user_id: Option<&str>,
    args: &ListArgs,
) -> Result<()> {
    let entries = load_timeline(config, source, user_id)?;
    let output = format_timeline(&entries, &args.filter_state(), args.spacing, &config.spacing);
    print!("{output}");
    Ok(())
}

pub fn list_years(config: &AppConfig, source: &dyn GoalSource, user_id: Option<&str>) -> Result<()> {
    let entries = load_timeline(config, source, user_id)?;
    print!("{}", format_years(&filter::extract_years(&entries)));
    Ok(())
}

pub fn list_users(source: &dyn GoalSource) -> Result<()> {
    let users = source
        .fetch_users()
        .with_context(|| format!("fetching users from {}", source.describe()))?;
    print!("{}", format_users(&users));
    Ok(())
}

fn load_timeline(
    config: &AppConfig,
    source: &dyn GoalSource,
    user_id: Option<&str>,
) -> Result<Vec<TimelineEntry>> {
    let goals = source::load_goals(source, user_id)
        .with_context(|| format!("loading goals from {}", source.describe()))?;
    Ok(sort_entries(goals, config.timeline.unknown_dates))
}

fn format_timeline(
    entries: &[TimelineEntry],
    state: &FilterState,
    spacing: bool,
    rules: &SpacingRules,
) -> String {
    let visible = filter::apply(entries, state);
    if visible.is_empty() {
        return "No goals found.\n".to_string();
    }
    let rows = project(&visible, spacing, rules, &VisibilitySignal::default());
    let mut out = String::new();
    for row in &rows {
        if row.spacing > 0.0 {
            let _ = writeln!(&mut out, "  ┆ +{:.1}", row.spacing);
        }
        let _ = writeln!(&mut out, "{}  {}", row.display_date, row.entry.name());
        let description = row.entry.goal().description.trim();
        if !description.is_empty() {
            let _ = writeln!(&mut out, "    {description}");
        }
    }
    out
}

fn format_years(years: &[i32]) -> String {
    if years.is_empty() {
        return "No years found.\n".to_string();
    }
    let mut out = String::new();
    for year in years {
        let _ = writeln!(&mut out, "{year}");
    }
    out
}

fn format_users(users: &[UserSummary]) -> String {
    if users.is_empty() {
        return "No users found.\n".to_string();
    }
    let mut out = String::new();
    for user in users {
        let mut headline = format!("{}  {}", user.id, user.username);
        if !user.email.is_empty() {
            let _ = write!(&mut headline, "  <{}>", user.email);
        }
        let _ = writeln!(&mut out, "{headline}");
        if !user.description.is_empty() {
            let _ = writeln!(&mut out, "    {}", user.description);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{goal, UnknownDatePlacement};
    use std::fs;
    use tempfile::TempDir;
    use time::macros::date;

    fn scenario() -> Vec<TimelineEntry> {
        let mut goals = vec![
            goal("1", "2021-03-01"),
            goal("2", "2021-06-01"),
            goal("3", "2022-01-01"),
        ];
        goals[2].description = "  New year  ".into();
        sort_entries(goals, UnknownDatePlacement::Epoch)
    }

    #[test]
    fn timeline_output_lists_filtered_goals_with_gaps() {
        let entries = scenario();
        let state = FilterState {
            year: YearFilter::Year(2021),
            ..FilterState::default()
        };
        let output = format_timeline(&entries, &state, true, &SpacingRules::default());
        assert_eq!(
            output,
            "March 1st, 2021  Goal 1\n  ┆ +18.4\nJune 1st, 2021  Goal 2\n"
        );

        let output = format_timeline(&entries, &FilterState::default(), false, &SpacingRules::default());
        assert!(!output.contains('┆'));
        assert!(output.ends_with("January 1st, 2022  Goal 3\n    New year\n"));
    }

    #[test]
    fn empty_results_are_reported() {
        let entries = scenario();
        let state = FilterState {
            start: Some(date!(2023 - 01 - 01)),
            ..FilterState::default()
        };
        assert_eq!(
            format_timeline(&entries, &state, true, &SpacingRules::default()),
            "No goals found.\n"
        );
        assert_eq!(format_years(&[]), "No years found.\n");
        assert_eq!(format_users(&[]), "No users found.\n");
    }

    #[test]
    fn years_and_users_come_from_a_file_source() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("users.json");
        fs::write(
            &path,
            r#"{"users": [{"id": "u1", "username": "ada", "email": "ada@example.com",
                "description": "Runner",
                "goals": [
                    {"id": "a", "name": "Run", "date": "2022-01-01"},
                    {"id": "b", "name": "Swim", "date": "2021-06-01"}
                ]}]}"#,
        )?;
        let cfg = AppConfig::default();
        let source = FileSource::new(path);

        let entries = load_timeline(&cfg, &source, Some("u1"))?;
        assert_eq!(format_years(&filter::extract_years(&entries)), "2021\n2022\n");
        assert_eq!(
            format_users(&source.fetch_users()?),
            "u1  ada  <ada@example.com>\n    Runner\n"
        );

        let err = load_timeline(&cfg, &source, None).unwrap_err();
        assert_eq!(err.root_cause().to_string(), "No user ID found");
        Ok(())
    }

    #[test]
    fn overrides_pick_the_source() -> Result<()> {
        let cfg = SourceConfig::default();
        let file = build_source(
            &cfg,
            &SourceOverride {
                file: Some(PathBuf::from("goals.json")),
                ..SourceOverride::default()
            },
        )?;
        assert_eq!(file.describe(), "goals.json");

        let graphql = build_source(&cfg, &SourceOverride::default())?;
        assert_eq!(graphql.describe(), crate::source::DEFAULT_ENDPOINT);

        let file_kind = SourceConfig {
            kind: SourceKind::File,
            ..SourceConfig::default()
        };
        assert!(build_source(&file_kind, &SourceOverride::default()).is_err());
        Ok(())
    }
}
