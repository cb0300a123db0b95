use charstats_core::config::{AppConfig, LoadOptions};
use charstats_docs::GoogleDocsClient;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_chat_token(&config));

            let credentials = check_credentials(&config);
            let credentials_pass = credentials.status == CheckStatus::Pass;
            checks.push(credentials);

            if credentials_pass {
                checks.push(check_document_fetch(&config));
            } else {
                checks.push(DoctorCheck::skipped(
                    "document_fetch",
                    "service account credentials are not readable",
                ));
            }
        }
        Err(error) => {
            let reason = "configuration did not load";
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("chat_token_readiness", reason));
            checks.push(DoctorCheck::skipped("credentials_readable", reason));
            checks.push(DoctorCheck::skipped("document_fetch", reason));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Bot tokens are three non-empty dot-separated segments.
fn check_chat_token(config: &AppConfig) -> DoctorCheck {
    let token = config.chat.bot_token.expose_secret();
    let segments: Vec<&str> = token.split('.').collect();

    if segments.len() == 3 && segments.iter().all(|segment| !segment.is_empty()) {
        DoctorCheck {
            name: "chat_token_readiness",
            status: CheckStatus::Pass,
            details: "bot token has the expected three-segment shape".to_string(),
        }
    } else {
        DoctorCheck {
            name: "chat_token_readiness",
            status: CheckStatus::Fail,
            details: format!(
                "bot token has {} segment(s); expected three dot-separated segments",
                segments.len()
            ),
        }
    }
}

fn check_credentials(config: &AppConfig) -> DoctorCheck {
    let path = &config.document.credentials_path;
    if path.is_file() {
        DoctorCheck {
            name: "credentials_readable",
            status: CheckStatus::Pass,
            details: format!("service account key found at `{}`", path.display()),
        }
    } else {
        DoctorCheck {
            name: "credentials_readable",
            status: CheckStatus::Fail,
            details: format!(
                "service account key not found at `{}`; set CHARSTATS_DOCUMENT_CREDENTIALS_PATH",
                path.display()
            ),
        }
    }
}

fn check_document_fetch(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "document_fetch",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let client = GoogleDocsClient::from_config(&config.document);
    let result = runtime.block_on(async {
        let text = client.fetch_text().await;
        client.shutdown().await;
        text
    });

    match result {
        Ok(text) if text.is_empty() => DoctorCheck {
            name: "document_fetch",
            status: CheckStatus::Fail,
            details: format!("document `{}` is empty", config.document.document_id),
        },
        Ok(text) => DoctorCheck {
            name: "document_fetch",
            status: CheckStatus::Pass,
            details: format!(
                "fetched document `{}` ({} characters)",
                config.document.document_id,
                text.chars().count()
            ),
        },
        Err(error) => DoctorCheck {
            name: "document_fetch",
            status: CheckStatus::Fail,
            details: format!("failed to fetch document: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
