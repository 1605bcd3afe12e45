//! Reference capabilities, confined to a sandbox directory.
//!
//! | name         | class  | does                                   |
//! |--------------|--------|----------------------------------------|
//! | `write_file` | unsafe | write text to a file under the sandbox |
//! | `read_file`  | safe   | read a text file under the sandbox     |
//! | `echo`       | safe   | return its `text` argument             |
//! | `ask_human`  | safe   | interrupt point for human input        |
//!
//! `ask_human` only makes sense listed in a run's `interrupt_capabilities`;
//! the engine then pauses before it would run and records the operator's
//! reply as its result. Its own handler refuses.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde_json::{json, Value};
use tracing::debug;

use stepwise_contracts::{
    capability::{CapabilityDescriptor, SafetyClass},
    error::{CapabilityError, RegistrationResult},
};
use stepwise_core::{traits::handler_fn, CapabilityRegistry};
use stepwise_policy::PresetCatalog;

/// The directory every file capability is confined to.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative path onto the sandbox. Absolute paths and `..` are
    /// refused.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, CapabilityError> {
        let path = Path::new(relative);
        if relative.trim().is_empty() {
            return Err(CapabilityError::fatal("path must not be empty"));
        }
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(CapabilityError::fatal(format!(
                "path '{relative}' leaves the sandbox"
            )));
        }
        Ok(self.root.join(path))
    }
}

// ── Descriptors ───────────────────────────────────────────────────────────────

pub fn write_file_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        "write_file",
        "Write text content to a file, replacing it if it exists",
        json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": { "type": "string", "minLength": 1 },
                "content": { "type": "string" }
            },
            "additionalProperties": false
        }),
        SafetyClass::Unsafe,
        Duration::from_secs(5),
        0,
    )
}

pub fn read_file_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        "read_file",
        "Read a text file",
        json!({
            "type": "object",
            "required": ["path"],
            "properties": { "path": { "type": "string", "minLength": 1 } },
            "additionalProperties": false
        }),
        SafetyClass::Safe,
        Duration::from_secs(5),
        1,
    )
}

pub fn echo_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        "echo",
        "Return the text argument unchanged",
        json!({
            "type": "object",
            "required": ["text"],
            "properties": { "text": { "type": "string" } }
        }),
        SafetyClass::Safe,
        Duration::from_secs(1),
        0,
    )
}

pub fn ask_human_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new(
        "ask_human",
        "Pause and ask a human operator a question; the reply becomes the result",
        json!({
            "type": "object",
            "required": ["question"],
            "properties": { "question": { "type": "string", "minLength": 1 } }
        }),
        SafetyClass::Safe,
        Duration::from_secs(1),
        0,
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────────

fn string_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, CapabilityError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CapabilityError::fatal(format!("missing string argument '{key}'")))
}

async fn write_file(sandbox: &Sandbox, args: Value) -> Result<Value, CapabilityError> {
    let relative = string_arg(&args, "path")?;
    let content = string_arg(&args, "content")?;
    let path = sandbox.resolve(relative)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CapabilityError::fatal(format!("cannot create directory for '{relative}': {e}")))?;
    }
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| CapabilityError::fatal(format!("cannot write '{relative}': {e}")))?;

    debug!(path = %path.display(), bytes = content.len(), "file written");
    Ok(json!({ "path": relative, "bytes": content.len() }))
}

async fn read_file(sandbox: &Sandbox, args: Value) -> Result<Value, CapabilityError> {
    let relative = string_arg(&args, "path")?;
    let path = sandbox.resolve(relative)?;

    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(json!({ "path": relative, "exists": true, "content": content })),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Ok(json!({ "path": relative, "exists": false }))
        }
        Err(e) => Err(CapabilityError::retriable(format!("cannot read '{relative}': {e}"))),
    }
}

/// Register `write_file` and `read_file` over `sandbox`.
pub fn register_file_capabilities(
    registry: &mut CapabilityRegistry,
    sandbox: Arc<Sandbox>,
) -> RegistrationResult<()> {
    let sb = Arc::clone(&sandbox);
    registry.register(
        write_file_descriptor(),
        Arc::new(handler_fn(move |args: Value| {
            let sb = Arc::clone(&sb);
            async move { write_file(&sb, args).await }
        })),
    )?;

    registry.register(
        read_file_descriptor(),
        Arc::new(handler_fn(move |args: Value| {
            let sb = Arc::clone(&sandbox);
            async move { read_file(&sb, args).await }
        })),
    )
}

/// Register the four reference capabilities.
///
/// `echo` is taken from the catalog's manifest when one is declared there,
/// so its contract can be tuned without a rebuild.
pub fn register_reference_capabilities(
    registry: &mut CapabilityRegistry,
    sandbox: Arc<Sandbox>,
    catalog: &PresetCatalog,
) -> RegistrationResult<()> {
    register_file_capabilities(registry, sandbox)?;

    let echo = Arc::new(handler_fn(|args: Value| async move {
        Ok::<_, CapabilityError>(args.get("text").cloned().unwrap_or(Value::Null))
    }));
    match catalog.manifest("echo") {
        Some(manifest) => registry.register_manifest(manifest.clone(), echo)?,
        None => registry.register(echo_descriptor(), echo)?,
    }

    registry.register(
        ask_human_descriptor(),
        Arc::new(handler_fn(|_args: Value| async {
            Err::<Value, _>(CapabilityError::fatal(
                "ask_human has no operator attached; list it in interrupt_capabilities",
            ))
        })),
    )?;

    Ok(())
}
