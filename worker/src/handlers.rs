// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Compiled-in handler bindings. A handler manifest names a `(module,
//! function)` pair per task type; the worker never resolves those strings by
//! dynamically loading code, it matches them against [`BUILTINS`] below and
//! refuses to start on a miss.
//!
//! The three demo handlers cover the common failure shapes: `t.ok` always
//! succeeds, `t.flake` fails twice then succeeds, `t.boom` always fails.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use prismq_core::{CoreError, Handler, HandlerFn, HandlerManifest, HandlerOutcome, HandlerRegistry};

type Constructor = fn() -> Arc<dyn Handler>;

const BUILTINS: &[(&str, &str, Constructor)] = &[
    ("prismq.demo", "noop", noop_handler),
    ("prismq.demo", "flake", flake_handler),
    ("prismq.demo", "boom", boom_handler),
];

/// Build a registry from a validated manifest, binding each entry's
/// `(module, function)` to its compiled constructor. An entry with no
/// matching constructor fails the whole build, so a worker never starts
/// half-configured.
pub fn build_registry(manifest: &HandlerManifest) -> Result<HandlerRegistry, CoreError> {
    let registry = HandlerRegistry::new();
    for entry in &manifest.handlers {
        let constructor = BUILTINS
            .iter()
            .find(|(module, function, _)| *module == entry.module && *function == entry.function)
            .map(|(_, _, ctor)| *ctor)
            .ok_or_else(|| CoreError::ManifestHandlerMismatch(entry.task_type.clone()))?;
        registry.register(entry.task_type.clone(), constructor(), false)?;
    }
    Ok(registry)
}

/// Registers the demo handlers under their literal scenario type names
/// directly, bypassing the manifest. Used when no `--handlers-config` is
/// given.
pub fn build_demo_registry() -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    registry.register("t.ok", noop_handler(), false).expect("fresh registry");
    registry.register("t.flake", flake_handler(), false).expect("fresh registry");
    registry.register("t.boom", boom_handler(), false).expect("fresh registry");
    registry
}

fn noop_handler() -> Arc<dyn Handler> {
    Arc::new(HandlerFn::new(|_payload, _cancel| async move {
        HandlerOutcome::Success(b"{}".to_vec())
    }))
}

/// Fails its first two invocations, succeeds from the third on. The counter
/// is shared for the process lifetime of this handler instance, not scoped
/// per task, which is fine for a demo handler but wouldn't be for a real one.
fn flake_handler() -> Arc<dyn Handler> {
    let attempts = Arc::new(AtomicU32::new(0));
    Arc::new(HandlerFn::new(move |_payload, _cancel| {
        let attempts = attempts.clone();
        async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                HandlerOutcome::Failure(format!("flake: attempt {n} failed"))
            } else {
                HandlerOutcome::Success(b"{}".to_vec())
            }
        }
    }))
}

fn boom_handler() -> Arc<dyn Handler> {
    Arc::new(HandlerFn::new(|_payload, _cancel| async move {
        HandlerOutcome::Failure("boom: handler always fails".to_string())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_registry_binds_known_module_function_pairs() {
        let manifest = HandlerManifest {
            handlers: vec![prismq_core::HandlerManifestEntry {
                task_type: "sources.demo".into(),
                module: "prismq.demo".into(),
                function: "noop".into(),
                version: None,
                description: None,
            }],
        };
        let registry = build_registry(&manifest).unwrap();
        assert!(registry.lookup("sources.demo").is_some());
    }

    #[test]
    fn build_registry_rejects_an_unbound_module_function_pair() {
        let manifest = HandlerManifest {
            handlers: vec![prismq_core::HandlerManifestEntry {
                task_type: "sources.unknown".into(),
                module: "sources.unknown_module".into(),
                function: "handle".into(),
                version: None,
                description: None,
            }],
        };
        let err = build_registry(&manifest).unwrap_err();
        assert!(matches!(err, CoreError::ManifestHandlerMismatch(ref t) if t == "sources.unknown"));
    }

    #[tokio::test]
    async fn flake_handler_fails_twice_then_succeeds() {
        let handler = flake_handler();
        let cancel = prismq_core::CancellationToken::new();
        let first = handler.invoke(b"{}", cancel.clone()).await;
        let second = handler.invoke(b"{}", cancel.clone()).await;
        let third = handler.invoke(b"{}", cancel).await;
        assert!(matches!(first, HandlerOutcome::Failure(_)));
        assert!(matches!(second, HandlerOutcome::Failure(_)));
        assert!(matches!(third, HandlerOutcome::Success(_)));
    }

    #[test]
    fn demo_registry_has_all_three_scenario_types() {
        let registry = build_demo_registry();
        assert!(registry.lookup("t.ok").is_some());
        assert!(registry.lookup("t.flake").is_some());
        assert!(registry.lookup("t.boom").is_some());
    }
}
