use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(url) = args.base_url.as_deref() {
        if url.trim().is_empty() {
            return Err("invalid --url, expected a non-empty base URL".to_string());
        }
        if reqwest::Url::parse(url.trim()).is_err() {
            return Err(format!("invalid --url '{}'", url.trim()));
        }
    }
    if let Some(size) = args.page_size {
        if size == 0 {
            return Err("invalid --page-size, expected positive integer".to_string());
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid --timeout, expected positive integer".to_string());
        }
    }
    Ok(())
}
