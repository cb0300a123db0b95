use std::fs;
use std::path::Path;

use charstats_core::config::{AppConfig, LoadOptions};
use charstats_core::{find_record, StatRecord};
use charstats_docs::GoogleDocsClient;

use super::CommandResult;

const COMMAND: &str = "lookup";

pub fn run(identity: &str, file: Option<&Path>, json_output: bool) -> CommandResult {
    let document = match file {
        Some(path) => read_export(path),
        None => fetch_configured_document(),
    };
    let document = match document {
        Ok(document) => document,
        Err(failure) => return failure,
    };

    let Some(record) = find_record(&document, identity) else {
        return CommandResult::failure(
            COMMAND,
            "record_not_found",
            format!("no block with header `Player: {identity}` in the document"),
            4,
        );
    };

    if json_output {
        let data = serde_json::to_value(&record).ok();
        return CommandResult::success_with_data(
            COMMAND,
            format!("found {} field(s) for {identity}", record.len()),
            data,
        );
    }

    CommandResult::text(render_human(&record))
}

fn read_export(path: &Path) -> Result<String, CommandResult> {
    match fs::read_to_string(path) {
        Ok(text) if text.is_empty() => Err(document_unavailable(format!(
            "document export `{}` is empty",
            path.display()
        ))),
        Ok(text) => Ok(text),
        Err(error) => Err(document_unavailable(format!(
            "could not read document export `{}`: {error}",
            path.display()
        ))),
    }
}

fn fetch_configured_document() -> Result<String, CommandResult> {
    let document = AppConfig::load_document(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                5,
            )
        })?;

    let client = GoogleDocsClient::from_config(&document);
    let text = runtime.block_on(async {
        let text = client.fetch_text().await;
        client.shutdown().await;
        text
    });

    match text {
        Ok(text) if text.is_empty() => Err(document_unavailable(format!(
            "document `{}` is empty",
            document.document_id
        ))),
        Ok(text) => Ok(text),
        Err(error) => Err(document_unavailable(format!("failed to fetch document: {error}"))),
    }
}

fn document_unavailable(message: String) -> CommandResult {
    CommandResult::failure(COMMAND, "document_unavailable", message, 3)
}

fn render_human(record: &StatRecord) -> String {
    let mut lines = vec![match record.character_name() {
        Some(name) => format!("{} ({name})", record.player()),
        None => record.player().to_string(),
    }];
    lines.extend(record.iter().map(|(key, value)| format!("- {key}: {value}")));
    lines.join("\n")
}
