use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lims_core::{
    evaluate, extract_variables, fill_template, Evaluation, FieldValue, FormField, LimsError,
    ProfileRegistry, RecomputeMode, TenantId, ValueMap, Widget,
};

#[derive(Parser)]
#[command(name = "lims")]
#[command(about = "LIMS test-profile data-entry CLI")]
struct Cli {
    /// Directory of per-tenant custom test files (`<tenant_id>.json`)
    #[arg(long, global = true)]
    custom_tests: Option<PathBuf>,
    /// Tenant whose custom tests are searched after the built-in catalog
    #[arg(long, global = true)]
    tenant: Option<String>,
    /// Recompute mode: single_pass or converge
    #[arg(long, global = true, default_value = "single_pass", value_parser = parse_mode)]
    mode: RecomputeMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List built-in profiles, and the tenant's custom tests when --tenant is given
    Profiles,
    /// Print the entry form for a test
    Show {
        /// Test name as it appears on the order
        test_name: String,
    },
    /// Evaluate a formula
    Eval {
        /// Formula, e.g. "{albumin} / {globulin}"
        formula: String,
        /// Operand values as key=value
        #[arg(value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },
    /// Apply edits in order and print the result to persist.
    ///
    /// A test without a profile is entered as free text through the `result` field.
    Enter {
        /// Test name as it appears on the order
        test_name: String,
        /// Edits as key=value; an empty value clears the field
        #[arg(value_parser = parse_assignment)]
        edits: Vec<(String, String)>,
        /// Previously stored result string
        #[arg(long, default_value = "")]
        stored: String,
        /// Discard a legacy free-text stored result instead of leaving it untouched
        #[arg(long)]
        replace_legacy: bool,
    },
    /// Print the input schema derived from an HTML report template
    Variables {
        /// Template file
        template: PathBuf,
    },
    /// Fill an HTML report template with values
    Render {
        /// Template file
        template: PathBuf,
        /// Values as key=value
        #[arg(value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },
}

fn parse_mode(s: &str) -> Result<RecomputeMode, LimsError> {
    s.parse()
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{s}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

fn value_map(pairs: Vec<(String, String)>) -> ValueMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k, FieldValue::Text(v)))
        .collect()
}

fn load_registry(custom_tests: Option<&Path>) -> anyhow::Result<ProfileRegistry> {
    let registry = ProfileRegistry::builtin()?;
    match custom_tests {
        Some(dir) => Ok(registry.load_custom_tests_dir(dir)?),
        None => Ok(registry),
    }
}

fn print_form(form: &[FormField]) {
    for row in form {
        if matches!(row.widget, Widget::Header) {
            println!("== {} ==", row.label);
            continue;
        }

        let mut line = format!("  {}", row.label);
        if let Some(key) = &row.key {
            line.push_str(&format!(" ({key})"));
        }
        if let Some(value) = &row.value {
            line.push_str(&format!(": {}", value.display()));
        }
        if let Some(unit) = &row.unit {
            line.push_str(&format!(" {unit}"));
        }
        if let Some(range) = &row.reference_range {
            line.push_str(&format!(" [ref {range}]"));
        }
        if let Some(flag) = row.flag {
            line.push_str(&format!(" {flag:?}"));
            if flag.is_critical() {
                line.push_str(" !!");
            }
        }
        match &row.widget {
            Widget::Dropdown { options } => line.push_str(&format!(" {{{}}}", options.join(" | "))),
            Widget::Calculated { formula } => line.push_str(&format!(" = {formula}")),
            _ => {}
        }
        println!("{line}");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lims_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let tenant = cli
        .tenant
        .as_deref()
        .map(TenantId::parse)
        .transpose()
        .context("invalid --tenant")?;

    match cli.command {
        Commands::Profiles => {
            let registry = load_registry(cli.custom_tests.as_deref())?;
            for profile in registry.builtin_profiles() {
                println!("{}\t{}", profile.profile_id(), profile.name());
            }
            if let Some(tenant) = &tenant {
                for profile in registry.tenant_profiles(tenant) {
                    println!("{}\t{}\t({})", profile.profile_id(), profile.name(), tenant);
                }
            }
        }
        Commands::Show { test_name } => {
            let registry = load_registry(cli.custom_tests.as_deref())?;
            let resolved = registry.resolve_entry(&test_name, tenant.as_ref());
            let profile = resolved.profile();
            if resolved.is_free_text() {
                println!("{test_name}: no profile, free-text result");
            } else {
                println!("{} [{}]", profile.name(), profile.profile_id());
            }
            if let Some(custom) = tenant
                .as_ref()
                .and_then(|tenant| registry.custom_test(&test_name, tenant))
            {
                match &custom.code {
                    Some(code) => println!("custom test {} (code {code})", custom.test_id),
                    None => println!("custom test {}", custom.test_id),
                }
            }
            print_form(&resolved.open("", cli.mode).form());
        }
        Commands::Eval { formula, values } => {
            match evaluate(&formula, &value_map(values)) {
                Evaluation::Ready(value) => println!("{value}"),
                Evaluation::NotReady(reason) => println!("not ready: {reason}"),
            }
        }
        Commands::Enter {
            test_name,
            edits,
            stored,
            replace_legacy,
        } => {
            let registry = load_registry(cli.custom_tests.as_deref())?;
            let resolved = registry.resolve_entry(&test_name, tenant.as_ref());
            if resolved.is_free_text() {
                eprintln!("no profile for '{test_name}'; entering a free-text result");
            }
            let mut session = resolved.open(&stored, cli.mode);
            if replace_legacy {
                session.replace_legacy();
            } else if let Some(legacy) = session.legacy() {
                eprintln!(
                    "stored result is legacy free text and is kept as-is \
                     (pass --replace-legacy to overwrite): {legacy}"
                );
            }

            for (key, value) in edits {
                let reaction = session.set(&key, FieldValue::Text(value));
                if !reaction.unsettled.is_empty() {
                    eprintln!("cleared unsettled fields: {}", reaction.unsettled.join(", "));
                }
            }

            println!("{}", session.save()?);
            for alert in session.alerts() {
                println!(
                    "[{:?}] {} ({} = {})",
                    alert.action,
                    alert.message,
                    alert.label,
                    alert.value.display()
                );
            }
        }
        Commands::Variables { template } => {
            let html = fs::read_to_string(&template)
                .with_context(|| format!("failed to read {}", template.display()))?;
            let schema = extract_variables(&html);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::Render { template, values } => {
            let html = fs::read_to_string(&template)
                .with_context(|| format!("failed to read {}", template.display()))?;
            println!("{}", fill_template(&html, &value_map(values)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_splits_on_first_equals() {
        assert_eq!(
            parse_assignment("note=a=b").expect("valid"),
            ("note".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_assignment("hb=").expect("clearing edit"),
            ("hb".to_string(), String::new())
        );
        assert!(parse_assignment("hb").is_err());
        assert!(parse_assignment(" =5").is_err());
    }

    #[test]
    fn cli_parses_enter_with_global_flags() {
        let cli = Cli::try_parse_from([
            "lims",
            "enter",
            "Kidney Function Test (KFT)",
            "potassium=7.5",
            "--mode",
            "converge",
        ])
        .expect("valid arguments");
        assert_eq!(cli.mode, RecomputeMode::Converge);
        match cli.command {
            Commands::Enter {
                test_name,
                edits,
                stored,
                replace_legacy,
            } => {
                assert_eq!(test_name, "Kidney Function Test (KFT)");
                assert_eq!(edits, vec![("potassium".to_string(), "7.5".to_string())]);
                assert!(stored.is_empty());
                assert!(!replace_legacy);
            }
            _ => panic!("expected enter"),
        }
    }

    #[test]
    fn unknown_test_opens_free_text_entry() {
        let registry = load_registry(None).expect("catalog");
        let resolved = registry.resolve_entry("Culture & Sensitivity", None);
        assert!(resolved.is_free_text());

        let mut session = resolved.open("", RecomputeMode::SinglePass);
        session.set("result", FieldValue::Text("No growth".into()));
        assert_eq!(session.save().expect("save"), "No growth");
    }

    #[test]
    fn cli_parses_replace_legacy_flag() {
        let cli = Cli::try_parse_from([
            "lims",
            "enter",
            "Lipid Profile",
            "--stored",
            "old notes",
            "--replace-legacy",
        ])
        .expect("valid arguments");
        assert!(matches!(
            cli.command,
            Commands::Enter { replace_legacy: true, ref stored, .. } if stored == "old notes"
        ));
    }

    #[test]
    fn cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["lims", "profiles", "--mode", "fixpoint"]).is_err());
    }
}
