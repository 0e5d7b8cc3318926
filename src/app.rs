use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::api::{HttpApi, ListApi, UserRecord, DEFAULT_PAGE_SIZE};
use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::controller::{Controller, ControllerError};
use crate::events::{ControllerEvent, EventSink};
use crate::export;
use crate::pager::PaginationSnapshot;
use crate::storage::FileSlot;

fn print_banner(no_color: bool) {
    let _ = no_color;
    const BANNER: &str = r#"
                             _      __
   ___  ___ ____ ____ ___  (_)___/ /__
  / _ \/ _ `/ _ `/ -_) _ \/ / __/  '_/
 / .__/\_,_/\_, /\__/ .__/_/\__/_/\_\
/_/        /___/   /_/
       paginated user browser & backup export
    "#;
    print!("{}", BANNER);
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[derive(Clone, Debug)]
struct RunConfig {
    base_url: String,
    page_size: u32,
    timeout: u64,
    proxy: Option<String>,
    state_path: PathBuf,
    export_dir: PathBuf,
    initial_courses: Vec<String>,
    no_color: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let base_url = args
        .base_url
        .or(cfg.base_url)
        .map(|u| trim_url(&u))
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "base URL is required (--url or base_url in the config)".to_string())?;
    if reqwest::Url::parse(&base_url).is_err() {
        return Err(format!("invalid base URL: {base_url}"));
    }

    let page_size = args.page_size.or(cfg.page_size).unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err("invalid page_size, expected positive integer".to_string());
    }
    let timeout = args.timeout.or(cfg.timeout).unwrap_or(10);

    let proxy = args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty());

    let state_path = match args.state_file.or(cfg.state_file) {
        Some(path) => config::expand_tilde(&path),
        None => config::default_state_path()
            .ok_or_else(|| "could not resolve a state file path (set --state-file)".to_string())?,
    };

    let export_dir = args
        .export_dir
        .or(cfg.export_dir)
        .map(|p| config::expand_tilde(&p))
        .unwrap_or_else(|| PathBuf::from("."));

    let initial_courses = if args.courses.is_empty() {
        cfg.courses.unwrap_or_default()
    } else {
        args.courses
    };
    let initial_courses: Vec<String> = initial_courses
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);

    Ok(RunConfig {
        base_url,
        page_size,
        timeout,
        proxy,
        state_path,
        export_dir,
        initial_courses,
        no_color,
    })
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Everything the terminal needs to redraw, rebuilt purely from controller
/// events. The app never reaches back into the controller to render.
#[derive(Default)]
struct View {
    users: Vec<UserRecord>,
    selected_on_page: HashSet<u64>,
    pagination: Option<PaginationSnapshot>,
    selected_total: usize,
    page_fully_selected: bool,
}

impl View {
    /// Returns true when the page itself changed and the table should be
    /// redrawn.
    fn absorb(&mut self, event: ControllerEvent) -> bool {
        match event {
            ControllerEvent::PageLoading { .. } => false,
            ControllerEvent::PageReplaced {
                users,
                selected_ids,
                pagination,
            } => {
                self.users = users;
                self.selected_on_page = selected_ids.into_iter().collect();
                self.pagination = Some(pagination);
                true
            }
            ControllerEvent::PaginationChanged { pagination } => {
                self.pagination = Some(pagination);
                false
            }
            ControllerEvent::SelectionChanged {
                selected_total,
                selected_on_page,
                page_fully_selected,
            } => {
                self.selected_total = selected_total;
                self.selected_on_page = selected_on_page.into_iter().collect();
                self.page_fully_selected = page_fully_selected;
                false
            }
            ControllerEvent::FetchFailed { message } => {
                eprintln!("{} {}", "fetch failed:".bold().red(), message);
                false
            }
            ControllerEvent::ExportFailed { message } => {
                eprintln!("{} {}", "export failed:".bold().red(), message);
                false
            }
            ControllerEvent::StorageDegraded { message } => {
                eprintln!("{} {}", "storage:".bold().yellow(), message);
                false
            }
        }
    }

    fn render_table(&self) {
        println!(
            "{:<4}{:>9}  {:<24}{:<30}{:<12}{:>8}",
            "", "id", "name", "email", "last login", "courses"
        );
        for user in &self.users {
            let mark = if self.selected_on_page.contains(&user.user_id) {
                "[x]".green().to_string()
            } else {
                "[ ]".to_string()
            };
            println!(
                "{:<4}{:>9}  {:<24}{:<30}{:<12}{:>8}",
                mark,
                user.user_id,
                truncate(&user.name, 23),
                truncate(&user.email, 29),
                truncate(&user.last_login, 11),
                user.num_courses
            );
        }
        if self.users.is_empty() {
            println!("  (no users match the current filter)");
        }
        self.render_status();
    }

    fn render_status(&self) {
        let (page, total_pages, total) = match &self.pagination {
            Some(p) => (p.page, p.total_pages, p.total_count),
            None => (1, 0, 0),
        };
        let all = if self.page_fully_selected {
            " :: page fully selected"
        } else {
            ""
        };
        println!(
            ":: page {}/{} :: {} users :: {} selected{}",
            page,
            total_pages.max(1),
            total,
            self.selected_total.to_string().bold(),
            all
        );
    }
}

fn print_command_help() {
    println!("commands:");
    println!("  n | next          next page");
    println!("  p | prev          previous page");
    println!("  g <N>             go to page N");
    println!("  f [a,b,..]        set course filter (no values clears it)");
    println!("  t <id>            toggle selection of one user");
    println!("  a                 select every user on this page");
    println!("  d                 deselect every user on this page");
    println!("  c                 list available course filter values");
    println!("  s                 show current page and selection status");
    println!("  x | export        export the selected users as CSV");
    println!("  h | help          show this help");
    println!("  q | quit          exit");
}

fn drain_events(
    rx: &mut mpsc::UnboundedReceiver<ControllerEvent>,
    view: &mut View,
) {
    let mut redraw = false;
    while let Ok(event) = rx.try_recv() {
        redraw |= view.absorb(event);
    }
    if redraw {
        view.render_table();
    }
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner(run.no_color);
    format_kv_line("endpoint", &run.base_url);
    format_kv_line("page size", &run.page_size.to_string());
    format_kv_line("state file", &run.state_path.display().to_string());
    format_kv_line("export dir", &run.export_dir.display().to_string());
    println!();

    let api = HttpApi::new(&run.base_url, run.timeout, run.proxy.as_deref())
        .map_err(|e| e.to_string())?;
    let slot = FileSlot::new(&run.state_path);
    let (events, mut events_rx) = EventSink::channel();
    let mut controller = Controller::new(api.clone(), slot, run.page_size, events);

    let pb = spinner("loading course catalog".to_string());
    let catalog = match api.fetch_courses().await {
        Ok(courses) => {
            pb.finish_and_clear();
            format_kv_line("courses", &courses.len().to_string());
            courses
        }
        Err(e) => {
            pb.finish_and_clear();
            eprintln!("{} {}", "catalog:".bold().yellow(), e);
            Vec::new()
        }
    };

    let mut view = View::default();

    if !run.initial_courses.is_empty() {
        controller.seed_filter(run.initial_courses.clone());
        format_kv_line("filter", &run.initial_courses.join(","));
    }

    let pb = spinner("loading page 1".to_string());
    let first_load = controller.start().await;
    pb.finish_and_clear();
    if first_load.is_err() {
        println!("initial load failed; fix the server and use 'g 1' to retry");
    }
    drain_events(&mut events_rx, &mut view);
    println!();
    print_command_help();

    let (line_tx, mut line_rx) = mpsc::channel::<String>(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        let line = line.trim().to_string();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line.as_str(), ""),
        };

        match command {
            "" => {}
            "q" | "quit" | "exit" => break,
            "h" | "help" | "?" => print_command_help(),
            "n" | "next" => {
                let pb = spinner("loading next page".to_string());
                let result = controller.next_page().await;
                pb.finish_and_clear();
                report_page_error(result);
            }
            "p" | "prev" => {
                let pb = spinner("loading previous page".to_string());
                let result = controller.previous_page().await;
                pb.finish_and_clear();
                report_page_error(result);
            }
            "g" | "page" => match rest.parse::<u32>() {
                Ok(page) => {
                    let pb = spinner(format!("loading page {page}"));
                    let result = controller.request_page(page).await;
                    pb.finish_and_clear();
                    report_page_error(result);
                }
                Err(_) => println!("usage: g <page number>"),
            },
            "f" | "filter" => {
                let courses: Vec<String> = rest
                    .split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                let label = if courses.is_empty() {
                    "clearing filter".to_string()
                } else {
                    format!("filtering by {}", courses.join(","))
                };
                let pb = spinner(label);
                let result = controller.apply_filter(courses).await;
                pb.finish_and_clear();
                report_page_error(result);
            }
            "t" | "toggle" => match rest.parse::<u64>() {
                Ok(id) => {
                    let selected = !controller.contains(id);
                    controller.toggle(id, selected);
                }
                Err(_) => println!("usage: t <user id>"),
            },
            "a" | "all" => controller.toggle_all_on_page(true),
            "d" | "none" => controller.toggle_all_on_page(false),
            "c" | "courses" => {
                if catalog.is_empty() {
                    println!("course catalog unavailable");
                } else {
                    for course in &catalog {
                        println!("  {course}");
                    }
                }
            }
            "s" | "stats" => view.render_status(),
            "x" | "export" => {
                let count = controller.selected_count();
                if count == 0 {
                    println!("{}", "no users selected, nothing to export".yellow());
                } else {
                    println!("export {count} selected users as CSV? [y/N]");
                    let confirmed = matches!(
                        line_rx.recv().await.as_deref().map(str::trim),
                        Some("y") | Some("Y") | Some("yes")
                    );
                    if confirmed {
                        let pb = spinner(format!("exporting {count} users"));
                        let result = controller.export().await;
                        pb.finish_and_clear();
                        match result {
                            Ok(artifact) => {
                                match export::write_artifact(&run.export_dir, &artifact).await {
                                    Ok(path) => println!(
                                        "{} {} users -> {}",
                                        "exported".bold().green(),
                                        count,
                                        path.display()
                                    ),
                                    Err(e) => eprintln!(
                                        "{} failed to write export file: {e}",
                                        "error:".bold().red()
                                    ),
                                }
                            }
                            Err(_) => {
                                // already reported through the event channel
                            }
                        }
                    } else {
                        println!("export cancelled");
                    }
                }
            }
            _ => println!("unknown command '{command}' (h for help)"),
        }

        drain_events(&mut events_rx, &mut view);
    }

    Ok(())
}

fn report_page_error(result: Result<(), ControllerError>) {
    match result {
        Ok(()) => {}
        Err(ControllerError::PageOutOfRange(e)) => println!("{e}"),
        Err(_) => {
            // fetch failures are reported through the event channel
        }
    }
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let user_config_path = args.config.clone().map(|p| config::expand_tilde(&p));
    let cfg = match user_config_path {
        Some(path) => config::load_config(&path, false)?,
        None => match config::default_config_path() {
            Some(path) => {
                config::ensure_default_config_file(&path)?;
                config::load_config(&path, true)?
            }
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
