//! Webview initialization script.
//!
//! Rendered from an [`InjectionPlan`]: it runs before any page script and
//! schedules each run-at bucket against the page lifecycle. Each section is
//! injected as one `<script>` element carrying the shim followed by the
//! section content. Code travels base64-encoded so no escaping of script
//! text is needed.

use crate::bundle::Section;
use crate::metadata::RunAt;
use crate::scheduler::InjectionPlan;
use crate::settings::Settings;
use crate::shim::shim_source;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PreloadOptions {
    pub settle_delay_ms: u64,
    pub body_poll_ms: u64,
    /// Forward page console output to the `report_console` command.
    pub forward_console: bool,
}

impl Default for PreloadOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl PreloadOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            settle_delay_ms: settings.settle_delay.as_millis() as u64,
            body_poll_ms: settings.body_poll_interval.as_millis().max(1) as u64,
            forward_console: true,
        }
    }
}

/// Load the artifact at `path` and render the script for it.
///
/// An unreadable artifact is logged and yields a script that injects
/// nothing, so the page still loads.
pub fn render_from_artifact(path: &Path, options: &PreloadOptions) -> String {
    let plan = match InjectionPlan::load(path) {
        Ok(plan) => plan,
        Err(e) => {
            warn!(error = %e, "skipping script injection");
            InjectionPlan::default()
        }
    };
    render(&plan, options)
}

pub fn render(plan: &InjectionPlan, options: &PreloadOptions) -> String {
    let mut combined = String::new();

    combined.push_str("(function() {\n");
    combined.push_str("  // Only run in the top frame, once per page\n");
    combined.push_str("  if (window !== window.top) return;\n");
    combined.push_str("  if (window.__userscriptLauncherInjected) return;\n");
    combined.push_str("  window.__userscriptLauncherInjected = true;\n\n");

    combined.push_str("  function decodeBase64(str) {\n");
    combined.push_str("    return new TextDecoder().decode(Uint8Array.from(atob(str), function(c) {\n");
    combined.push_str("      return c.charCodeAt(0);\n");
    combined.push_str("    }));\n");
    combined.push_str("  }\n\n");

    if options.forward_console {
        combined.push_str(CONSOLE_BRIDGE);
    }

    if plan.is_empty() {
        combined.push_str("  console.log('[Userscript Launcher] No scripts to inject');\n");
        combined.push_str("})();\n");
        return combined;
    }

    combined.push_str(&format!("  var SHIM = decodeBase64('{}');\n\n", encode(&shim_source())));

    combined.push_str("  function injectIntoPage(code, name) {\n");
    combined.push_str("    var script = document.createElement('script');\n");
    combined.push_str("    script.textContent = SHIM + '\\n' + code;\n");
    combined.push_str("    script.setAttribute('data-userscript-launcher', name);\n");
    combined.push_str("    (document.head || document.documentElement).appendChild(script);\n");
    combined.push_str("    script.remove();\n");
    combined.push_str("  }\n\n");

    combined.push_str("  function injectBucket(runAt, sections) {\n");
    combined.push_str("    console.log('[Userscript Launcher] Injecting ' + sections.length + ' script(s) at ' + runAt);\n");
    combined.push_str("    for (var i = 0; i < sections.length; i++) {\n");
    combined.push_str("      var name = decodeBase64(sections[i][0]);\n");
    combined.push_str("      try {\n");
    combined.push_str("        injectIntoPage(decodeBase64(sections[i][1]), name);\n");
    combined.push_str("      } catch (e) {\n");
    combined.push_str("        console.error('[Userscript Launcher] Failed to inject ' + name + ':', e);\n");
    combined.push_str("      }\n");
    combined.push_str("    }\n");
    combined.push_str("  }\n\n");

    for run_at in RunAt::ALL {
        let sections = plan.bucket(run_at);
        if sections.is_empty() {
            continue;
        }
        let waiter = match run_at {
            RunAt::DocumentStart => WAIT_FOR_ROOT.replace("__SETTLE_MS__", &options.settle_delay_ms.to_string()),
            RunAt::DocumentBody => WAIT_FOR_BODY.replace("__POLL_MS__", &options.body_poll_ms.to_string()),
            RunAt::DocumentEnd => WAIT_FOR_DOM_READY.to_string(),
            RunAt::DocumentIdle => WAIT_FOR_LOAD.to_string(),
        };
        combined.push_str(&format!("  // {}\n", run_at));
        combined.push_str(&waiter.replace("__SECTIONS__", &encode_sections(sections)));
        combined.push('\n');
    }

    combined.push_str("})();\n");
    combined
}

fn encode(text: &str) -> String {
    BASE64.encode(text.as_bytes())
}

fn encode_sections(sections: &[Section]) -> String {
    let entries: Vec<String> = sections
        .iter()
        .map(|s| format!("['{}', '{}']", encode(&s.name), encode(&s.content)))
        .collect();
    format!("[{}]", entries.join(", "))
}

const CONSOLE_BRIDGE: &str = r#"  if (window.__TAURI__ && window.__TAURI__.core) {
    ['log', 'info', 'warn', 'error', 'debug'].forEach(function(level) {
      var original = console[level];
      if (typeof original !== 'function') return;
      console[level] = function() {
        var parts = [];
        for (var i = 0; i < arguments.length; i++) {
          try { parts.push(String(arguments[i])); } catch (e) {}
        }
        try {
          var pending = window.__TAURI__.core.invoke('report_console', { message: parts.join(' ') });
          if (pending && pending.catch) pending.catch(function() {});
        } catch (e) {}
        return original.apply(console, arguments);
      };
    });
  }

"#;

const WAIT_FOR_ROOT: &str = r#"  (function(sections) {
    if (document.documentElement) {
      injectBucket('document-start', sections);
      return;
    }
    var observer = new MutationObserver(function() {
      if (document.documentElement && document.head) {
        observer.disconnect();
        setTimeout(function() { injectBucket('document-start', sections); }, __SETTLE_MS__);
      }
    });
    observer.observe(document, { childList: true, subtree: true });
  })(__SECTIONS__);
"#;

const WAIT_FOR_BODY: &str = r#"  (function(sections) {
    if (document.body) {
      injectBucket('document-body', sections);
      return;
    }
    var poll = setInterval(function() {
      if (document.body) {
        clearInterval(poll);
        injectBucket('document-body', sections);
      }
    }, __POLL_MS__);
  })(__SECTIONS__);
"#;

const WAIT_FOR_DOM_READY: &str = r#"  (function(sections) {
    if (document.readyState !== 'loading') {
      injectBucket('document-end', sections);
      return;
    }
    document.addEventListener('DOMContentLoaded', function() {
      injectBucket('document-end', sections);
    }, { once: true });
  })(__SECTIONS__);
"#;

const WAIT_FOR_LOAD: &str = r#"  (function(sections) {
    if (document.readyState === 'complete') {
      injectBucket('document-idle', sections);
      return;
    }
    window.addEventListener('load', function() {
      setTimeout(function() { injectBucket('document-idle', sections); }, 0);
    }, { once: true });
  })(__SECTIONS__);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle;

    fn plan_with(run_at: &str) -> InjectionPlan {
        let code = format!("// ==UserScript==\n// @run-at {run_at}\n// ==/UserScript==\nrun();");
        InjectionPlan::from_bundle(&bundle::join(&[Section::new("s", code)]))
    }

    #[test]
    fn only_non_empty_buckets_are_rendered() {
        let script = render(&plan_with("document-idle"), &PreloadOptions::default());
        assert!(script.contains("// document-idle"));
        assert!(script.contains("window.addEventListener('load'"));
        assert!(!script.contains("MutationObserver"));
        assert!(!script.contains("setInterval"));
    }

    #[test]
    fn timings_come_from_options() {
        let options = PreloadOptions {
            settle_delay_ms: 75,
            body_poll_ms: 25,
            forward_console: false,
        };
        let start = render(&plan_with("document-start"), &options);
        assert!(start.contains("}, 75);"));
        let body = render(&plan_with("document-body"), &options);
        assert!(body.contains("}, 25);"));
        assert!(!body.contains("report_console"));
    }

    #[test]
    fn unreadable_artifact_renders_empty_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = render_from_artifact(&dir.path().join("gone.js"), &PreloadOptions::default());
        assert!(script.contains("No scripts to inject"));
        assert!(!script.contains("injectIntoPage"));
    }
}
