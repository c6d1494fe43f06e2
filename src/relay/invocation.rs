use crate::model::{ArgStyle, RelayConfig, Request};
use std::process::Stdio;
use tokio::process::Command;

/// Arguments appended after the configured program arguments.
pub(crate) fn request_args(style: ArgStyle, request: &Request) -> Vec<String> {
    match style {
        ArgStyle::YearOnly => vec![request.audit_year.clone()],
        ArgStyle::Flags => {
            let mut args = Vec::with_capacity(4);
            if !request.auditor_ein.is_empty() {
                args.push("--auditor_ein".to_string());
                args.push(request.auditor_ein.clone());
            }
            if !request.audit_year.is_empty() {
                args.push("--audit_year".to_string());
                args.push(request.audit_year.clone());
            }
            args
        }
    }
}

/// Build the collaborator command for one request with piped output.
pub(crate) fn build_command(cfg: &RelayConfig, request: &Request) -> Command {
    let mut cmd = Command::new(&cfg.program);
    cmd.args(&cfg.program_args)
        .args(request_args(cfg.arg_style, request))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &cfg.working_dir {
        cmd.current_dir(dir);
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestId;

    fn req(ein: &str, year: &str) -> Request {
        Request {
            id: RequestId(1),
            auditor_ein: ein.into(),
            audit_year: year.into(),
        }
    }

    #[test]
    fn year_only_passes_the_year_verbatim() {
        assert_eq!(
            request_args(ArgStyle::YearOnly, &req("12-3456789", "2023")),
            vec!["2023"]
        );
        // No trimming, no validation.
        assert_eq!(
            request_args(ArgStyle::YearOnly, &req("", " 2023 ")),
            vec![" 2023 "]
        );
    }

    #[test]
    fn flags_forward_both_fields() {
        assert_eq!(
            request_args(ArgStyle::Flags, &req("12-3456789", "2023")),
            vec!["--auditor_ein", "12-3456789", "--audit_year", "2023"]
        );
    }

    #[test]
    fn flags_omit_empty_fields() {
        assert_eq!(
            request_args(ArgStyle::Flags, &req("", "2023")),
            vec!["--audit_year", "2023"]
        );
        assert!(request_args(ArgStyle::Flags, &req("", "")).is_empty());
    }
}
