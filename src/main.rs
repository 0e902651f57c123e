use std::{
    fs,
    io::{self, Read},
    path::Path,
    process,
};

use regen_cache::{
    cache::{
        InvalidationEvent, InvalidationResolver, KeyCanonicalizer, RequestContext, Variants,
        normalize_path,
    },
    config::{self, Command, FreshnessArgs, KeyArgs, ResolveArgs, Settings},
    error::AppError,
    infra::{error::InfraError, telemetry},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tracing::{Dispatch, Level, debug, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Key(args) => run_key(args),
        Command::Freshness(args) => run_freshness(&settings, args),
        Command::Resolve(args) => run_resolve(&settings, args),
        Command::Rules => run_rules(&settings),
    }
}

fn run_key(args: KeyArgs) -> Result<(), AppError> {
    let variants = parse_variant_args(&args.variants)?;
    let context = RequestContext::new(args.path).with_variants(variants);
    let key = KeyCanonicalizer::new().canonicalize(&context);

    print_json(&json!({
        "path": normalize_path(&context.path),
        "key": key,
    }))
}

fn run_freshness(settings: &Settings, args: FreshnessArgs) -> Result<(), AppError> {
    let now = args.now.unwrap_or_else(unix_now);
    let created_at = args.created_at.unwrap_or(now);
    let engine = settings.freshness_engine();
    let verdict = engine.classify(created_at, args.ttl, now);

    debug!(created_at, ttl = args.ttl, now, state = %verdict.state, "Classified artifact");

    print_json(&json!({
        "state": verdict.state,
        "action": verdict.recommended_action(),
        "age_seconds": verdict.age_seconds,
        "expires_in_seconds": verdict.expires_in_seconds,
        "percent_remaining": engine.percent_remaining(created_at, args.ttl, now),
        "seconds_until_full_expiry": engine.seconds_until_full_expiry(created_at, args.ttl, now),
    }))
}

fn run_resolve(settings: &Settings, args: ResolveArgs) -> Result<(), AppError> {
    let input = read_input(args.file.as_deref())?;
    let events = parse_events(&input)?;
    let resolver = settings.resolver();

    let output: Vec<Value> = if args.estimate {
        events
            .iter()
            .map(|event| {
                json!({
                    "event_type": event.event_type,
                    "estimated_keys": resolver.estimate_count(event),
                })
            })
            .collect()
    } else {
        events
            .iter()
            .zip(resolver.resolve_batch(&events))
            .map(|(event, resolution)| {
                json!({
                    "event_type": event.event_type,
                    "reason": resolution.reason,
                    "purge_keys": resolution.purge_keys,
                })
            })
            .collect()
    };

    print_json(&output)
}

fn run_rules(settings: &Settings) -> Result<(), AppError> {
    let resolver: InvalidationResolver = settings.resolver();
    let rules: Map<String, Value> = resolver
        .rules()
        .iter()
        .map(|(event_type, surfaces)| (event_type.to_string(), json!(surfaces)))
        .collect();

    print_json(&rules)
}

fn read_input(file: Option<&Path>) -> Result<String, AppError> {
    match file {
        Some(path) => fs::read_to_string(path).map_err(|err| InfraError::from(err).into()),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(InfraError::from)?;
            Ok(buffer)
        }
    }
}

/// Accepts a single event object or a list of them.
fn parse_events(input: &str) -> Result<Vec<InvalidationEvent>, AppError> {
    let value: Value = serde_json::from_str(input)?;
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| InvalidationEvent::from_json(item).map_err(AppError::from))
            .collect(),
        other => Ok(vec![InvalidationEvent::from_json(&other)?]),
    }
}

/// Turn `KEY=VALUE` arguments into variants.
///
/// Values that parse as JSON scalars keep their type; anything else is a
/// string. `a.b=1` nests `b` under `a`.
fn parse_variant_args(args: &[String]) -> Result<Variants, AppError> {
    let mut root = Map::new();

    for arg in args {
        let Some((key, raw)) = arg.split_once('=') else {
            return Err(AppError::validation(format!(
                "variant `{arg}` must be KEY=VALUE"
            )));
        };

        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value) if !value.is_array() && !value.is_object() => value,
            _ => Value::String(raw.to_string()),
        };

        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(AppError::validation(format!(
                "variant key `{key}` has an empty segment"
            )));
        }

        let (leaf, parents) = segments
            .split_last()
            .ok_or_else(|| AppError::validation("variant key must not be empty"))?;

        let mut map = &mut root;
        for parent in parents {
            let entry = map
                .entry(parent.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            map = entry.as_object_mut().ok_or_else(|| {
                AppError::validation(format!("variant `{parent}` is both a value and a group"))
            })?;
        }
        map.insert(leaf.to_string(), value);
    }

    Ok(Variants::try_from(Value::Object(root))?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
