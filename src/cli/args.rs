use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pagepick",
    version,
    about = "paginated user browser with cross-page selection and CSV export",
    long_about = "Pagepick is a terminal client for a paginated user API: browse pages, filter by course, keep a durable cross-page selection and export the selected users as a CSV backup.\n\nExamples:\n  pagepick -u http://127.0.0.1:5000\n  pagepick -u http://127.0.0.1:5000 -F MAT101 -F FIS201\n  pagepick --config ~/.pagepick/config.yml\n\nTip: Use the config file to persist connection settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'u',
        long = "url",
        visible_alias = "base-url",
        value_name = "URL",
        help_heading = "Connection",
        help = "Base URL of the user API."
    )]
    pub base_url: Option<String>,

    #[arg(
        short = 'T',
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Connection",
        help = "HTTP request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'x',
        long = "proxy",
        value_name = "URL",
        help_heading = "Connection",
        help = "HTTP proxy to route requests through."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 's',
        long = "page-size",
        value_name = "N",
        help_heading = "Browsing",
        help = "Records per page (server default: 50)."
    )]
    pub page_size: Option<u32>,

    #[arg(
        short = 'F',
        long = "course",
        visible_alias = "filter",
        value_name = "CODE",
        action = ArgAction::Append,
        help_heading = "Browsing",
        help = "Initial course filter value (repeatable); empty means all users."
    )]
    pub courses: Vec<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.pagepick/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "state-file",
        value_name = "FILE",
        help_heading = "Storage",
        help = "Durable selection slot (defaults to ~/.pagepick/selection.json)."
    )]
    pub state_file: Option<String>,

    #[arg(
        short = 'o',
        long = "export-dir",
        value_name = "DIR",
        help_heading = "Output",
        help = "Directory export artifacts are written to (defaults to the current directory)."
    )]
    pub export_dir: Option<String>,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,
}
