#![forbid(unsafe_code)]

use crate::{Command, TypesAction};
use anyhow::Context;
use boost_board::{Board, BoardError, PlacedNode};
use boost_core::analytics::{EventRecord, dashboard, utc_date};
use boost_core::paths::CollectionPath;
use boost_core::{CollectionKey, NodeId, Position, RenderedBody, UserId};
use boost_storage::{CollectionQuery, DocumentStore, LocalAuth, now_ms};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

pub(crate) fn execute(
    board: &mut Board,
    auth: &LocalAuth,
    store: &dyn DocumentStore,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Types { action } => types(board, action),
        Command::Submit { text, type_name } => {
            let key = type_for_submit(board, &type_name)?;
            let id = board.submit(&key, &text)?;
            board.pump();
            println!("{id}");
            Ok(())
        }
        Command::Upload { file, type_name } => {
            let key = type_for_submit(board, &type_name)?;
            let bytes =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let id = board.submit_file(&key, &file_name(&file)?, &bytes)?;
            board.pump();
            println!("{id}");
            Ok(())
        }
        Command::Rm { node_id } => {
            board.delete_node(&NodeId::try_new(node_id)?)?;
            Ok(())
        }
        Command::Edit { node_id, text } => {
            board.edit_node(&NodeId::try_new(node_id)?, &text)?;
            Ok(())
        }
        Command::Move { node_id, x, y } => {
            board.move_node(&NodeId::try_new(node_id)?, Position::new(x, y))?;
            print_board(board, false)
        }
        Command::Show {
            type_name,
            width,
            json,
        } => {
            if let Some(width) = width {
                board.resize(width);
            }
            board.set_filter(type_name.as_deref())?;
            print_board(board, json)
        }
        Command::Login { user } => {
            auth.sign_in(UserId::try_new(user)?);
            board.pump();
            Ok(())
        }
        Command::Logout => {
            auth.sign_out();
            board.pump();
            Ok(())
        }
        Command::Stats { json } => stats(store, json),
    }
}

fn types(board: &mut Board, action: TypesAction) -> anyhow::Result<()> {
    match action {
        TypesAction::List => {
            let mut listed = board.registered_types()?;
            for active in board.active_types() {
                if !listed.iter().any(|known| known.key == active.key) {
                    listed.push(active);
                }
            }
            for node_type in listed {
                let count = board
                    .submitted_nodes(&node_type.key)
                    .map_or(0, <[_]>::len);
                println!("{}\t{}\t{count}", node_type.key, node_type.display_name);
            }
            Ok(())
        }
        TypesAction::Add { name } => {
            let key = board.define_type(&name)?;
            println!("{key}");
            Ok(())
        }
        TypesAction::Rm { name } => Ok(board.delete_type(&name)?),
        TypesAction::Rename { name, display_name } => {
            let key = board.resolve_type(&name)?;
            Ok(board.rename_type(&key, &display_name)?)
        }
    }
}

/// Active type named `name`; a name no type answers to defines a new one.
fn type_for_submit(board: &mut Board, name: &str) -> Result<CollectionKey, BoardError> {
    match board.activate_type(name) {
        Err(BoardError::UnknownType { .. }) => board.define_type(name),
        other => other,
    }
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShownNode<'a> {
    id: &'a str,
    type_key: &'a str,
    type_name: &'a str,
    submitted: bool,
    is_file: bool,
    message: &'a str,
    x: f64,
    y: f64,
    moved: bool,
}

impl<'a> From<&PlacedNode<'a>> for ShownNode<'a> {
    fn from(placed: &PlacedNode<'a>) -> Self {
        let node = placed.node;
        Self {
            id: node.id.as_str(),
            type_key: node.type_key.as_str(),
            type_name: &node.type_name,
            submitted: node.submitted,
            is_file: node.is_file(),
            message: if node.submitted {
                node.payload.message()
            } else {
                node.draft.as_str()
            },
            x: placed.position.x,
            y: placed.position.y,
            moved: placed.moved,
        }
    }
}

fn print_board(board: &Board, json: bool) -> anyhow::Result<()> {
    let placed = board.nodes();
    if json {
        let shown: Vec<ShownNode<'_>> = placed.iter().map(|item| ShownNode::from(item)).collect();
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    let mut current: Option<&CollectionKey> = None;
    for item in &placed {
        let node = item.node;
        if current != Some(&node.type_key) {
            current = Some(&node.type_key);
            let phase = board
                .column_phase(&node.type_key)
                .map(|phase| format!("{phase:?}").to_lowercase())
                .unwrap_or_default();
            println!("{} ({}) [{phase}]", node.type_name, node.type_key);
        }
        let rendered = node.render();
        let body = match &rendered.body {
            RenderedBody::Input { .. } => "<entry>".to_string(),
            RenderedBody::Text(text) => text.clone(),
            RenderedBody::Link { url, file_name } => format!("{file_name} <{url}>"),
        };
        let pin = if item.moved { " *" } else { "" };
        println!(
            "  ({:.0}, {:.0}){pin} {} {body}",
            item.position.x, item.position.y, node.id
        );
    }
    Ok(())
}

fn stats(store: &dyn DocumentStore, json: bool) -> anyhow::Result<()> {
    let docs = store.fetch_collection(&CollectionQuery::oldest_first(CollectionPath::events()))?;
    let events: Vec<EventRecord> = docs
        .into_iter()
        .filter_map(|doc| {
            serde_json::from_value(Value::Object(doc.fields))
                .inspect_err(|err| {
                    tracing::warn!(doc_id = %doc.id, error = %err, "skipping malformed event");
                })
                .ok()
        })
        .collect();
    let report = dashboard(&events, now_ms());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    let metrics = &report.metrics;
    println!("users:           {}", metrics.total_users);
    println!("active (24h):    {}", metrics.active_users);
    println!("goals:           {}", metrics.total_goals);
    println!("anonymous goals: {}", metrics.anonymous_goals);
    for day in &report.daily_goals {
        println!("  {} {}", day.date, day.count);
    }
    for event in &report.recent {
        println!(
            "  {} {:?} {}",
            utc_date(event.timestamp),
            event.kind,
            event.user_id
        );
    }
    Ok(())
}
