//! Page-side reporter runtime
//!
//! Injected before navigation together with the client mod's browser bundle.
//! It only exposes host capabilities on `window.__patchReporter`; all of the
//! discovery and verification logic runs in the controlling process.

use anyhow::Result;

/// Global the runtime installs its bridge object on
pub const BRIDGE_GLOBAL: &str = "__patchReporter";

const REPORTER_RUNTIME: &str = r#"(function (token) {
  const debug = (...args) => console.log("[PUP_DEBUG]", ...args);
  const fatal = err => console.error("[Vencord]", "Reporter:", "A fatal error occurred:", err);

  const state = { wreq: null, ready: false, loaded: [], anonymous: 0 };
  const Webpack = () => Vencord.Webpack;
  const wreq = () => state.wreq ?? Webpack().wreq;

  function describeArg(arg) {
    if (typeof arg === "string") return { type: "string", value: arg };
    if (Array.isArray(arg) && arg.every(a => typeof a === "string")) return { type: "strings", values: arg };
    if (arg instanceof RegExp) return { type: "regex", source: String(arg), default: arg === Webpack().DefaultExtractAndLoadChunksRegex };
    if (typeof arg === "function") return { type: "filter", source: String(arg), props: arg.$$vencordProps?.map(String) ?? null };
    if (arg != null && typeof arg === "object") return { type: "mapper", entries: Object.entries(arg).map(([key, value]) => ({ key, value: describeArg(value) })) };
    return { type: "other", repr: String(arg) };
  }

  try {
    Webpack().beforeInitListeners.add(instance => { state.wreq = instance; });
    Webpack().factoryListeners.add((factory, moduleId) => {
      const id = moduleId ?? `anonymous:${state.anonymous++}`;
      state.loaded.push({ id: String(id), source: String(factory) });
    });
    Webpack().onceReady.then(() => { state.ready = true; debug("Webpack is ready"); });
    Webpack().waitFor("loginToken", m => { debug("Logging in with token..."); m.loginToken(token); });
  } catch (e) {
    fatal(e);
  }

  window.__patchReporter = {
    isReady: () => state.ready && wreq() != null,
    registeredFactories: () => Object.keys(wreq().m),
    factorySource: id => { const f = wreq().m[id]; return f == null ? null : String(f); },
    drainLoadedFactories: () => state.loaded.splice(0),
    chunkAssetPath: id => { const p = wreq().u(id); return p == null ? null : String(p); },
    publicPath: () => String(wreq().p ?? ""),
    fetchAsset: async url => {
      const res = await fetch(url);
      if (!res.ok) throw new Error(`HTTP ${res.status} for ${url}`);
      return res.text();
    },
    loadChunk: async id => { await wreq().e(id); return true; },
    require: id => {
      if (wreq().m[id] == null) return false;
      wreq()(id);
      return true;
    },
    chunkMapSource: () => String(wreq().u),
    searchHistory: () => Webpack().lazyWebpackSearchHistory.map(([kind, args], index) => ({ index, kind, args: args.map(describeArg) })),
    replaySearch: async (index, method) => {
      const W = Webpack();
      const [, args] = W.lazyWebpackSearchHistory[index];
      try {
        let result;
        if (method === "proxyLazyWebpack" || method === "LazyComponentWebpack") {
          result = args[0]();
        } else if (method === "extractAndLoadChunks") {
          result = await W.extractAndLoadChunks(args[0], args[1]);
          if (result === false) result = null;
        } else if (method === "mapMangledModule") {
          result = W.mapMangledModule(args[0], args[1]);
          if (Object.keys(args[1]).length !== Object.keys(result).length) return false;
        } else {
          result = W[method](...args);
        }
        if (result == null) return false;
        if (result.$$vencordInternal != null && result.$$vencordInternal() == null) return false;
        return true;
      } catch {
        return false;
      }
    },
    unmatchedPatches: () => Vencord.Plugins.patches.filter(p => !p.all).map(p => ({ plugin: String(p.plugin), find: String(p.find) })),
    signalDone: () => { console.log("[PUPPETEER_TEST_DONE_SIGNAL]"); return true; },
  };
})"#;

/// Build the pre-navigation document script.
///
/// The bundle and runtime only activate when the page's host ends with
/// `host_domain`, so the script is inert on any other origin.
pub fn document_script(bundle: &str, token: &str, host_domain: &str) -> Result<String> {
    let domain = serde_json::to_string(host_domain)?;
    let token = serde_json::to_string(token)?;

    Ok(format!(
        "if (location.host.endsWith({domain})) {{\n{bundle}\n;{REPORTER_RUNTIME}({token});\n}}\n"
    ))
}
