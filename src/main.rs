use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use mason::analyzer::{self, AnalyzeOpts};
use mason::ast::format_program;
use mason::error::LangError;
use mason::eval;
use mason::output;
use mason::parser::parse;
use mason::workspace::{Project, Workspace};

const USAGE: &str = "\
usage: mason <command> [args]

commands:
  setup <build-dir> [source-dir]   evaluate the project and write the build state
  eval <file>                      evaluate a single build file
  ast <file>                       parse a build file and print the formatted tree
  parse-check <file>               report whether a build file parses
  analyze [opts] [source-dir]      dry-run the project and print diagnostics
      --trace        print every file evaluated
      --value NAME   print the final value of one variable
      --werror       treat warnings as errors";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let command = match args.next() {
        Some(command) => command,
        None => bail!("{USAGE}"),
    };
    let rest: Vec<String> = args.collect();

    match command.as_str() {
        "setup" => cmd_setup(&rest),
        "eval" => cmd_eval(&rest),
        "ast" => cmd_ast(&rest),
        "parse-check" => cmd_parse_check(&rest),
        "analyze" => cmd_analyze(&rest),
        "--help" | "-h" | "help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

fn rendered(err: LangError) -> anyhow::Error {
    anyhow!("{}", err.render())
}

fn cmd_setup(args: &[String]) -> Result<()> {
    let build_dir = args.first().ok_or_else(|| anyhow!("missing build dir\n{USAGE}"))?;
    let source_dir = args.get(1).map(String::as_str).unwrap_or(".");
    if args.len() > 2 {
        bail!("too many arguments for setup");
    }

    let source_root = PathBuf::from(source_dir);
    let build_root = PathBuf::from(build_dir);
    std::fs::create_dir_all(&build_root)
        .with_context(|| format!("creating {build_root:?}"))?;

    let mut wk = Workspace::new(source_root, build_root);
    eval::eval_project(&mut wk).map_err(rendered)?;
    output::write_private(&mut wk).map_err(rendered)?;

    for diag in wk.sorted_diagnostics() {
        eprintln!("{diag}");
    }
    let graph = output::collect(&wk);
    println!(
        "configured project '{}': {} targets, {} tests",
        wk.cur_project().name,
        graph.targets.len(),
        graph.tests.len()
    );
    Ok(())
}

fn cmd_eval(args: &[String]) -> Result<()> {
    let [path] = args else {
        bail!("eval takes exactly one file\n{USAGE}");
    };
    let path = Path::new(path);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let mut wk = Workspace::new(dir.clone(), dir.join("build"));
    wk.projects.push(Project::new(
        "".into(),
        dir.clone(),
        dir.join("build"),
    ));
    eval::eval_file(&mut wk, path).map_err(rendered)?;
    for diag in wk.sorted_diagnostics() {
        eprintln!("{diag}");
    }
    Ok(())
}

fn cmd_ast(args: &[String]) -> Result<()> {
    let [path] = args else {
        bail!("ast takes exactly one file\n{USAGE}");
    };
    let source =
        std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let program = parse(&source).map_err(rendered)?;
    print!("{}", format_program(&program));
    Ok(())
}

fn cmd_parse_check(args: &[String]) -> Result<()> {
    let [path] = args else {
        bail!("parse-check takes exactly one file\n{USAGE}");
    };
    let source =
        std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    parse(&source).map_err(rendered)?;
    Ok(())
}

fn cmd_analyze(args: &[String]) -> Result<()> {
    let mut opts = AnalyzeOpts::default();
    let mut source_dir: Option<String> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--trace" => opts.trace = true,
            "--werror" => opts.werror = true,
            "--value" => {
                opts.value = Some(
                    iter.next()
                        .ok_or_else(|| anyhow!("missing variable name after --value"))?
                        .clone(),
                );
            }
            other if !other.starts_with('-') => {
                if source_dir.replace(other.to_string()).is_some() {
                    bail!("too many arguments for analyze");
                }
            }
            other => bail!("unknown analyze flag '{other}'\n{USAGE}"),
        }
    }

    let source_root = PathBuf::from(source_dir.unwrap_or_else(|| ".".to_string()));
    let code = analyzer::run(&source_root, &opts).map_err(rendered)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
