use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use vtl_preview::cli::{CliArgs, Mode};
use vtl_preview::diagnostics::{Diagnostic, DiagnosticSource};
use vtl_preview::messages::{Msg, RenderMsg};
use vtl_preview::model::{Pane, PreviewModel};
use vtl_preview::render::RequestStatus;
use vtl_preview::{PreviewApp, PreviewConfig};

/// Upper bound on a single CLI render
const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

fn main() -> Result<ExitCode> {
    let _log_guard = vtl_preview::tracing::init();

    let args = CliArgs::parse();
    let mut config = PreviewConfig::load();
    args.apply_to(&mut config);

    let template = read(&args.template)?;
    let data = match &args.data {
        Some(path) => read(path)?,
        None => String::new(),
    };

    let mut model = PreviewModel::new(&template, &data, config);
    model.template.document.set_path(args.template.clone());
    if let Some(path) = &args.data {
        model.data.document.set_path(path.clone());
    }

    match args.mode() {
        Mode::Highlight => {
            print_highlights(&model.template)?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Check => {
            let ok = report_validation(&model);
            Ok(exit_code(ok))
        }
        Mode::Render => render(model, args.output.as_deref()),
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn render(model: PreviewModel, output_path: Option<&Path>) -> Result<ExitCode> {
    report_validation(&model);

    let mut app = PreviewApp::new(model).context("Failed to start render worker")?;
    app.send(Msg::Render(RenderMsg::Request));
    let settled = app.wait_until_idle(RENDER_TIMEOUT);
    let model = app.model();
    if !settled || !model.render.status.is_finished() {
        anyhow::bail!("Render did not finish within {:?}", RENDER_TIMEOUT);
    }

    for diagnostic in &model.output.diagnostics {
        report(model, diagnostic);
    }

    let output = &model.output.text;
    match output_path {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", output),
    }

    Ok(exit_code(model.render.status == RequestStatus::Completed))
}

/// Print inline diagnostics of both panes. Returns true if none are errors.
fn report_validation(model: &PreviewModel) -> bool {
    let mut ok = true;
    for diagnostic in model.template.diagnostics.iter().chain(&model.data.diagnostics) {
        ok &= !diagnostic.is_error();
        report(model, diagnostic);
    }
    ok
}

fn report(model: &PreviewModel, diagnostic: &Diagnostic) {
    let name = match diagnostic.source {
        DiagnosticSource::Data => model.data.document.display_name(),
        DiagnosticSource::Template | DiagnosticSource::Engine => {
            model.template.document.display_name()
        }
    };
    if diagnostic.has_position() {
        eprintln!("{}:{}", name, diagnostic);
    } else {
        eprintln!("{}: {}", name, diagnostic);
    }
}

fn print_highlights(pane: &Pane) -> Result<()> {
    let lines: Vec<_> = pane
        .highlights
        .lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            json!({
                "line": idx + 1,
                "spans": line.spans,
                "end_state": line.end_state,
            })
        })
        .collect();
    let dump = json!({
        "language": pane.document.language.display_name(),
        "lines": lines,
    });
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
