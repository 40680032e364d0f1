mod app;
mod config;

use std::env;
use std::fs;
use std::io;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use codescript_core::actions::UserAction;
use codescript_core::archive::export_archive;
use codescript_core::archive::import_archive;
use codescript_core::state::AppSettings;
use codescript_core::state::LogEntry;
use codescript_core::state::LogLevel;
use codescript_core::state::Role;
use codescript_core::state::SessionId;
use codescript_core::state::Theme;
use codescript_core::stats::WorkspaceStats;
use codescript_exec::CommandModelClient;
use codescript_exec::Provider;
use tracing_subscriber::EnvFilter;

use crate::app::App;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> CliResult<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };
    let rest: Vec<String> = args.collect();

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            return Ok(());
        }
        "--version" | "-V" | "version" => {
            println!("codescript {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let config = config::load_config()?;
    let data_dir = config::data_dir(&config);
    let provider = Provider::parse(&config.model.provider);
    let client = CommandModelClient::new(provider, config.agent.max_context_chars);
    let mut app = App::open(&config, &data_dir, Arc::new(client))?;
    let since = last_seq(&app);

    match command.as_str() {
        "chat" => chat(&mut app, &rest)?,
        "agent" => agent(&mut app, &rest, since)?,
        "files" => list_files(&app),
        "show" => show_file(&app, &rest)?,
        "write" => write_file(&mut app, &rest)?,
        "rm" => {
            let name = one_arg(&rest, "rm <name>")?;
            let id = app
                .file_id(name)
                .ok_or_else(|| format!("no file named `{name}`"))?;
            app.dispatch(UserAction::DeleteFile { id });
        }
        "mv" => {
            let [old, new] = rest.as_slice() else {
                return Err("usage: mv <old> <new>".into());
            };
            let id = app
                .file_id(old)
                .ok_or_else(|| format!("no file named `{old}`"))?;
            app.dispatch(UserAction::RenameFile {
                id,
                name: new.clone(),
            });
        }
        "sessions" => list_sessions(&app),
        "new-session" => {
            app.dispatch(UserAction::NewSession);
            if let Some(session) = app.state().current_session() {
                println!("{}", session.id);
            }
        }
        "use-session" => {
            let id = SessionId(one_arg(&rest, "use-session <id>")?.to_string());
            app.dispatch(UserAction::SelectSession(id.clone()));
            if app.state().current_session.as_ref() != Some(&id) {
                return Err(format!("no session with id `{id}`").into());
            }
        }
        "logs" => logs(&app, &rest)?,
        "clear-logs" => app.dispatch(UserAction::ClearLogs),
        "stats" => print_stats(&app),
        "export" => {
            let path = one_arg(&rest, "export <zip>")?;
            let bytes = export_archive(app.state().files.files())?;
            fs::write(path, bytes)?;
            println!("exported {} file(s) to {path}", app.state().files.len());
        }
        "import" => {
            let path = one_arg(&rest, "import <zip>")?;
            let imported = import_archive(&fs::read(path)?)?;
            let count = imported.len();
            app.dispatch(UserAction::ImportFiles(imported));
            println!("imported {count} file(s)");
        }
        "settings" => settings(&mut app, &rest)?,
        _ => {
            print_help();
            return Err(format!("unknown command: {command}").into());
        }
    }

    if command != "agent" {
        report_problems(&app, since);
    }
    if !app.state().settings.auto_save && mutates_workspace(&command) {
        eprintln!("auto-save is off: this change was not saved (enable it with `settings auto_save on`)");
    }
    Ok(())
}

/// Commands whose result only reaches disk through auto-save.
fn mutates_workspace(command: &str) -> bool {
    matches!(
        command,
        "chat" | "agent" | "write" | "rm" | "mv" | "new-session" | "clear-logs" | "import"
    )
}

fn one_arg<'a>(args: &'a [String], usage: &str) -> CliResult<&'a str> {
    match args {
        [value] => Ok(value.as_str()),
        _ => Err(format!("usage: {usage}").into()),
    }
}

fn joined(args: &[String], usage: &str) -> CliResult<String> {
    let text = args.join(" ");
    if text.trim().is_empty() {
        return Err(format!("usage: {usage}").into());
    }
    Ok(text)
}

fn last_seq(app: &App) -> u64 {
    app.state().logs.iter().last().map_or(0, |entry| entry.seq)
}

fn new_entries(app: &App, since: u64) -> impl Iterator<Item = &LogEntry> {
    app.state().logs.iter().filter(move |entry| entry.seq > since)
}

fn report_problems(app: &App, since: u64) {
    for entry in new_entries(app, since) {
        if matches!(entry.level, LogLevel::Warn | LogLevel::Error) {
            eprintln!("{}", entry.message);
        }
    }
}

fn chat(app: &mut App, args: &[String]) -> CliResult<()> {
    let text = joined(args, "chat <message>")?;
    app.dispatch(UserAction::SendMessage(text));
    app.wait_idle();
    let reply = app
        .state()
        .current_session()
        .and_then(|session| session.messages.last())
        .filter(|message| message.role == Role::Assistant);
    if let Some(reply) = reply {
        println!("{}", reply.content);
    }
    Ok(())
}

fn agent(app: &mut App, args: &[String], since: u64) -> CliResult<()> {
    let instruction = joined(args, "agent <instruction>")?;
    app.dispatch(UserAction::SubmitInstruction(instruction));
    app.wait_idle();
    for entry in new_entries(app, since) {
        println!("[{}] {}", entry.source.label(), entry.message);
        for action in &entry.actions {
            println!("  {:<6} {}", action.kind, action.name);
        }
    }
    Ok(())
}

fn list_files(app: &App) {
    let selected = app.state().selected_file.as_ref();
    for file in app.state().files.iter() {
        let marker = if Some(&file.id) == selected { '*' } else { ' ' };
        println!(
            "{marker} {:<32} {:<12} {:>5} lines",
            file.name,
            file.language,
            file.line_count()
        );
    }
}

fn show_file(app: &App, args: &[String]) -> CliResult<()> {
    let name = one_arg(args, "show <name>")?;
    let file = app
        .file_id(name)
        .and_then(|id| app.state().files.find_by_id(&id))
        .ok_or_else(|| format!("no file named `{name}`"))?;
    print!("{}", file.content);
    if !file.content.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn write_file(app: &mut App, args: &[String]) -> CliResult<()> {
    let (name, source) = match args {
        [name] => (name, None),
        [name, flag, path] if flag == "--from" => (name, Some(PathBuf::from(path))),
        _ => return Err("usage: write <name> [--from <path>]".into()),
    };
    let content = match source {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let action = match app.file_id(name) {
        Some(id) => UserAction::EditFile { id, content },
        None => UserAction::CreateFile {
            name: name.clone(),
            content,
        },
    };
    app.dispatch(action);
    Ok(())
}

fn list_sessions(app: &App) {
    let current = app.state().current_session.as_ref();
    for session in &app.state().sessions {
        let marker = if Some(&session.id) == current { '*' } else { ' ' };
        println!(
            "{marker} {}  {} ({} messages)",
            session.id,
            session.title,
            session.messages.len()
        );
    }
}

fn logs(app: &App, args: &[String]) -> CliResult<()> {
    let transcript = app.state().logs.transcript();
    match args {
        [] => {
            if !transcript.is_empty() {
                println!("{transcript}");
            }
        }
        [flag, path] if flag == "--download" => {
            fs::write(path, transcript)?;
            println!("wrote {} log entries to {path}", app.state().logs.len());
        }
        _ => return Err("usage: logs [--download <path>]".into()),
    }
    Ok(())
}

fn print_stats(app: &App) {
    let stats = WorkspaceStats::compute(app.state().files.iter(), &app.state().logs);
    println!("files:       {}", stats.file_count);
    println!("lines:       {}", stats.total_lines);
    println!("characters:  {}", stats.total_chars);
    println!("agent tasks: {}", stats.agent_tasks);
    for share in &stats.languages {
        println!(
            "  {:<12} {:>4} ({:.1}%)",
            share.language, share.count, share.percent
        );
    }
}

fn settings(app: &mut App, args: &[String]) -> CliResult<()> {
    match args {
        [] => {
            let settings = &app.state().settings;
            println!("theme      {}", settings.theme.label());
            println!("font_size  {}", settings.font_size);
            println!("auto_save  {}", settings.auto_save);
            println!("model      {}", settings.model);
            Ok(())
        }
        [key, value] => {
            let updated = apply_setting(app.state().settings.clone(), key, value)?;
            app.dispatch(UserAction::UpdateSettings(updated));
            Ok(())
        }
        _ => Err("usage: settings [<key> <value>]".into()),
    }
}

fn apply_setting(mut settings: AppSettings, key: &str, value: &str) -> CliResult<AppSettings> {
    match key {
        "theme" => {
            settings.theme = Theme::parse(value).ok_or_else(|| format!("unknown theme: {value}"))?;
        }
        "font_size" | "font-size" => {
            settings.font_size = value.parse()?;
        }
        "auto_save" | "auto-save" => {
            settings.auto_save = match value {
                "true" | "on" | "yes" => true,
                "false" | "off" | "no" => false,
                _ => return Err(format!("expected true or false, got `{value}`").into()),
            };
        }
        "model" => {
            settings.model = value.to_string();
        }
        _ => return Err(format!("unknown setting: {key}").into()),
    }
    Ok(settings)
}

fn print_help() {
    println!("codescript {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  codescript chat <message>");
    println!("  codescript agent <instruction>");
    println!("  codescript files | show <name> | write <name> [--from <path>]");
    println!("  codescript rm <name> | mv <old> <new>");
    println!("  codescript sessions | new-session | use-session <id>");
    println!("  codescript logs [--download <path>] | clear-logs | stats");
    println!("  codescript export <zip> | import <zip>");
    println!("  codescript settings [<key> <value>]");
    println!("  codescript --help");
    println!("  codescript --version");
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn settings_keys_update_one_field() {
        let base = AppSettings::default();

        let themed = apply_setting(base.clone(), "theme", "OLED").expect("theme");
        assert_eq!(themed.theme, Theme::Oled);
        assert_eq!(themed.font_size, base.font_size);

        let quiet = apply_setting(base.clone(), "auto-save", "off").expect("auto save");
        assert!(!quiet.auto_save);

        let sized = apply_setting(base, "font_size", "18").expect("font size");
        assert_eq!(sized.font_size, 18);
    }

    #[test]
    fn bad_setting_values_are_rejected() {
        assert!(apply_setting(AppSettings::default(), "theme", "light").is_err());
        assert!(apply_setting(AppSettings::default(), "font_size", "big").is_err());
        assert!(apply_setting(AppSettings::default(), "colour", "red").is_err());
    }

    #[test]
    fn single_argument_commands_reject_extra_args() {
        let args = vec!["a.py".to_string(), "b.py".to_string()];
        assert!(one_arg(&args, "show <name>").is_err());
        assert_eq!(one_arg(&args[..1], "show <name>").expect("one"), "a.py");
    }

    #[test]
    fn only_workspace_edits_warn_about_auto_save() {
        for command in ["write", "agent", "import", "clear-logs"] {
            assert!(mutates_workspace(command), "{command}");
        }
        for command in ["files", "show", "settings", "use-session", "export"] {
            assert!(!mutates_workspace(command), "{command}");
        }
    }
}
