use std::{fs, path::Path, process, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vellum::{
    application::{
        AppError, PathResolver, PathSettings, Resolution, ViewEngine, ViewOptions,
    },
    cache::{CacheConfig, spawn_sweeper},
    config::{self, Command, GroupArgs, PathsArgs, RenderArgs, Settings, WatchArgs},
    domain::{context::DataContext, group::GroupKey},
    infra::{error::InfraError, jinja::JinjaEngine, store::DirectoryStore, telemetry},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| InfraError::configuration(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Render(args) => run_render(&settings, &args),
        Command::Watch(args) => run_watch(&settings, &args).await,
        Command::Paths(args) => run_paths(&settings, &args),
    }
}

fn run_render(settings: &Settings, args: &RenderArgs) -> Result<(), AppError> {
    let engine = build_engine(settings, &args.root)?;
    let group = group_key(&args.group)?;
    let model = load_model(args)?;
    let output = render_once(&engine, &group, args, &model)?;
    println!("{output}");
    Ok(())
}

async fn run_watch(settings: &Settings, args: &WatchArgs) -> Result<(), AppError> {
    let render = &args.render;
    let engine = build_engine(settings, &render.root)?;
    let group = group_key(&render.group)?;
    let model = load_model(render)?;

    let sweeper = spawn_sweeper(
        Arc::clone(engine.cache()),
        CacheConfig::from(&settings.cache).sweep_interval(),
    );
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(target: "vellum::api", view = %render.view, group = %group, "Watching view, press Ctrl-C to stop");
    let mut last: Option<String> = None;
    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            _ = interval.tick() => {
                let rendered =
                    tokio::task::block_in_place(|| render_once(&engine, &group, render, &model));
                match rendered {
                    Ok(output) => {
                        if last.as_deref() != Some(output.as_str()) {
                            println!("{output}");
                            last = Some(output);
                        }
                    }
                    Err(err @ (AppError::NotFound { .. } | AppError::View(_))) => {
                        warn!(target: "vellum::api", error = %err, "Render failed, retrying");
                        last = None;
                    }
                    Err(err) => break Err(err),
                }
            }
        }
    };

    sweeper.abort();
    outcome
}

fn run_paths(settings: &Settings, args: &PathsArgs) -> Result<(), AppError> {
    let group = group_key(&args.group)?;
    let resolver = PathResolver::new(PathSettings::from(&settings.views));
    for (kind, folders) in [
        ("views", resolver.view_folders(&group)),
        ("layouts", resolver.layout_folders(&group)),
        ("partials", resolver.partial_folders(&group)),
    ] {
        println!("{kind}:");
        for folder in folders {
            println!("  {folder}");
        }
    }
    Ok(())
}

fn build_engine(settings: &Settings, root: &Path) -> Result<ViewEngine, AppError> {
    if !root.is_dir() {
        return Err(AppError::validation(format!(
            "`{}` is not a directory",
            root.display()
        )));
    }
    let store = Arc::new(DirectoryStore::new(root));
    let engine = ViewEngine::new(
        store,
        JinjaEngine::new(),
        ViewOptions::from(&settings.views),
        CacheConfig::from(&settings.cache),
    )?;
    Ok(engine)
}

fn group_key(args: &GroupArgs) -> Result<GroupKey, AppError> {
    let group = match args.area.as_deref() {
        Some(area) => GroupKey::new(area, args.controller.as_str())?,
        None => GroupKey::controller_only(args.controller.as_str())?,
    };
    Ok(group)
}

fn load_model(args: &RenderArgs) -> Result<DataContext, AppError> {
    let model: Value = match (&args.data, &args.data_file) {
        (Some(inline), _) => serde_json::from_str(inline)
            .map_err(|err| AppError::validation(format!("--data is not valid JSON: {err}")))?,
        (None, Some(path)) => {
            let text = fs::read_to_string(path).map_err(|err| InfraError::io(path, err))?;
            serde_json::from_str(&text).map_err(|err| {
                AppError::validation(format!("`{}` is not valid JSON: {err}", path.display()))
            })?
        }
        (None, None) => Value::Null,
    };
    Ok(DataContext::from_serialize(&model)?)
}

fn render_once(
    engine: &ViewEngine,
    group: &GroupKey,
    args: &RenderArgs,
    model: &DataContext,
) -> Result<String, AppError> {
    let resolution = if args.partial {
        engine.resolve_partial(group, &args.view)?
    } else {
        engine.resolve(group, &args.view, args.layout.as_deref())?
    };
    match resolution {
        Resolution::Found(view) => Ok(view.render(model)?),
        Resolution::NotFound { searched } => Err(AppError::NotFound {
            name: args.view.clone(),
            searched,
        }),
    }
}
