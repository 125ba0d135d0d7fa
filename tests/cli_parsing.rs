use clap::Parser;
use faultline::cli::commands::case::CaseCommands;
use faultline::cli::commands::config::ConfigCommands;
use faultline::cli::{Cli, Commands};
use std::path::PathBuf;

#[test]
fn test_parse_case_turn() {
    let cli = Cli::try_parse_from(vec![
        "faultline",
        "case",
        "turn",
        "3f2a",
        "Errors started at noon",
        "--evidence",
        "logs/app.log",
        "-e",
        "dashboards/latency.png",
        "--model-output",
        "reply.json",
    ])
    .unwrap();

    match cli.command {
        Commands::Case(args) => match args.command {
            CaseCommands::Turn {
                id,
                content,
                role,
                evidence,
                model_output,
            } => {
                assert_eq!(id, "3f2a");
                assert_eq!(content, "Errors started at noon");
                assert_eq!(role, "user");
                assert_eq!(evidence, vec!["logs/app.log", "dashboards/latency.png"]);
                assert_eq!(model_output, Some(PathBuf::from("reply.json")));
            }
            _ => panic!("Wrong case command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(vec!["faultline", "case", "list", "--json", "--config", "alt.yaml"]).unwrap();
    assert!(cli.json);
    assert_eq!(cli.config, Some(PathBuf::from("alt.yaml")));
    assert!(matches!(
        cli.command,
        Commands::Case(args) if matches!(args.command, CaseCommands::List)
    ));
}

#[test]
fn test_parse_case_show_history() {
    let cli = Cli::try_parse_from(vec!["faultline", "case", "show", "abcd", "--history"]).unwrap();
    match cli.command {
        Commands::Case(args) => {
            assert!(matches!(args.command, CaseCommands::Show { ref id, history: true } if id == "abcd"));
        }
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_replay_and_config() {
    let cli = Cli::try_parse_from(vec!["faultline", "replay", "script.yaml", "--fail-fast"]).unwrap();
    match cli.command {
        Commands::Replay(args) => {
            assert_eq!(args.script, PathBuf::from("script.yaml"));
            assert!(args.fail_fast);
        }
        _ => panic!("Wrong top-level command"),
    }

    let cli = Cli::try_parse_from(vec!["faultline", "config", "show"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config(args) if matches!(args.command, ConfigCommands::Show)
    ));
}

#[test]
fn test_missing_arguments_are_rejected() {
    assert!(Cli::try_parse_from(vec!["faultline", "case", "turn", "abcd"]).is_err());
    assert!(Cli::try_parse_from(vec!["faultline", "case", "open"]).is_err());
    assert!(Cli::try_parse_from(vec!["faultline"]).is_err());
}
