//! Smoke test
//!
//! The third sandbox gate. A fresh engine context per run, with loop and
//! recursion limits, renders the compiled component once with its default
//! props. Only the capabilities the harness passes in exist; the context has
//! no host bindings at all.

use boa_engine::{Context, JsObject, JsResult, JsString, JsValue, Source};
use serde::Serialize;

/// Host harness: builds the capability set, instantiates the factory and
/// walks the element tree once. Returns the number of rendered nodes.
const HARNESS_JS: &str = r#"(function (factory, propsJson, themeJson) {
  "use strict";
  var Fragment = Object.freeze({ fragment: true });
  function h(type, props) {
    if (type === undefined || type === null) {
      throw new TypeError("element type is " + type + " (is a component undefined?)");
    }
    return { type: type, props: props || {}, children: Array.prototype.slice.call(arguments, 2) };
  }
  function noop() {}
  function useState(initial) {
    return [typeof initial === "function" ? initial() : initial, noop];
  }
  function useReducer(reducer, initialArg, init) {
    return [init ? init(initialArg) : initialArg, noop];
  }
  function useEffect() {}
  function useRef(initial) { return { current: initial }; }
  function useMemo(fn) { return fn(); }
  function useCallback(fn) { return fn; }
  var theme = Object.freeze(JSON.parse(themeJson));
  var React = Object.freeze({
    createElement: h, Fragment: Fragment, useState: useState, useEffect: useEffect,
    useRef: useRef, useMemo: useMemo, useCallback: useCallback, useReducer: useReducer
  });

  var Game = factory(h, Fragment, React, useState, useEffect, useRef, useMemo, useCallback, useReducer, theme);
  if (typeof Game !== "function") {
    throw new TypeError("source does not define a Game component");
  }

  var nodes = 0;
  function render(node, depth) {
    if (depth > 200) throw new RangeError("render depth exceeded");
    if (node === null || node === undefined || typeof node === "boolean") return;
    if (typeof node === "string" || typeof node === "number") { nodes++; return; }
    if (Array.isArray(node)) {
      for (var i = 0; i < node.length; i++) render(node[i], depth + 1);
      return;
    }
    if (typeof node === "object" && "type" in node && "children" in node) {
      if (typeof node.type === "function") {
        var props = Object.assign({}, node.props);
        props.children = node.children.length === 1 ? node.children[0] : node.children;
        render(node.type(props), depth + 1);
        return;
      }
      nodes++;
      for (var j = 0; j < node.children.length; j++) render(node.children[j], depth + 1);
      return;
    }
    throw new TypeError("objects are not valid as children (found " + typeof node + ")");
  }

  var props = JSON.parse(propsJson);
  props.onComplete = noop;
  props.onProgress = noop;
  render(h(Game, props), 0);
  if (nodes === 0) throw new Error("Game rendered nothing");
  return nodes;
})"#;

/// Read-only design tokens handed to components as `theme`
pub const THEME_JSON: &str = r##"{
  "colors": {
    "background": "#0f172a", "surface": "#1e293b", "text": "#f8fafc", "muted": "#94a3b8",
    "primary": "#6366f1", "success": "#22c55e", "danger": "#ef4444", "warning": "#f59e0b"
  },
  "radius": 12,
  "spacing": 8,
  "font": "Inter, system-ui, sans-serif"
}"##;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmokeOutcome {
    pub rendered_nodes: usize,
}

/// Renders a compiled factory once inside an isolated engine context
#[derive(Debug, Clone)]
pub struct SmokeRunner {
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
}

impl Default for SmokeRunner {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
        }
    }
}

impl SmokeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh context with this runner's loop and recursion limits
    pub(crate) fn limited_context(&self) -> Context {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.loop_iteration_limit);
        context.runtime_limits_mut().set_recursion_limit(self.recursion_limit);
        context
    }

    /// Render `factory` with `props` (already carrying `config`). Any throw
    /// during instantiation or render comes back as the error string.
    pub fn run(&self, factory: &str, props: &serde_json::Value) -> Result<SmokeOutcome, String> {
        let mut context = self.limited_context();

        let harness = context
            .eval(Source::from_bytes(HARNESS_JS.as_bytes()))
            .map_err(|e| format!("harness failed to load: {}", e))?;
        // The factory text is only ever evaluated as a returned expression
        // inside a function body, never at global scope
        let factory = function_from_body(&mut context, &[], &format!("return {}\n;", factory))
            .and_then(|loader| loader.call(&JsValue::undefined(), &[], &mut context))
            .map_err(|e| format!("component failed to load: {}", e))?;

        let harness = harness
            .as_callable()
            .ok_or_else(|| "harness is not callable".to_string())?
            .clone();
        let args = [
            factory,
            JsValue::from(JsString::from(props.to_string().as_str())),
            JsValue::from(JsString::from(THEME_JSON)),
        ];
        let rendered = match harness.call(&JsValue::undefined(), &args, &mut context) {
            Ok(value) => value,
            // Thrown error objects read better as `TypeError: ...` than as opaque values
            Err(e) => {
                return Err(match e.try_native(&mut context) {
                    Ok(native) => native.to_string(),
                    Err(_) => e.to_string(),
                })
            }
        };

        Ok(SmokeOutcome {
            rendered_nodes: rendered.as_number().map(|n| n as usize).unwrap_or(0),
        })
    }
}

/// Build a function from parameter names and a body without running it.
/// The engine parses the body as a function body on its own, so no text in
/// it can end the function early.
pub(crate) fn function_from_body(context: &mut Context, params: &[&str], body: &str) -> JsResult<JsObject> {
    let constructor = context.intrinsics().constructors().function().constructor();
    let mut args: Vec<JsValue> = params.iter().map(|p| JsValue::from(JsString::from(*p))).collect();
    args.push(JsValue::from(JsString::from(body)));
    constructor.construct(&args, None, context)
}
