//! `GM_*` host API given to every injected script.
//!
//! Storage lives in `localStorage` under [`STORAGE_PREFIX`]. The source is
//! prepended to each injected section, so it checks a presence flag and
//! returns early when the API already exists.

/// Prefix of every shim-managed `localStorage` key.
pub const STORAGE_PREFIX: &str = "gm_";

pub const HANDLER_NAME: &str = "Userscript Launcher";

const SHIM_TEMPLATE: &str = r#"(function() {
  if (window.__userscriptLauncherShim) return;
  window.__userscriptLauncherShim = true;

  var PREFIX = '__PREFIX__';

  window.unsafeWindow = window;
  window.GM_info = {
    script: { name: '__HANDLER__', version: '__VERSION__' },
    scriptHandler: '__HANDLER__',
    version: '__VERSION__'
  };

  window.GM_getValue = function(key, defaultValue) {
    try {
      var value = localStorage.getItem(PREFIX + key);
      return value !== null ? JSON.parse(value) : defaultValue;
    } catch (e) {
      console.warn('[GM_getValue] Error:', e);
      return defaultValue;
    }
  };
  window.GM_setValue = function(key, value) {
    try {
      localStorage.setItem(PREFIX + key, JSON.stringify(value));
    } catch (e) {
      console.warn('[GM_setValue] Error:', e);
    }
  };
  window.GM_deleteValue = function(key) {
    try {
      localStorage.removeItem(PREFIX + key);
    } catch (e) {
      console.warn('[GM_deleteValue] Error:', e);
    }
  };
  window.GM_listValues = function() {
    var keys = [];
    try {
      for (var i = 0; i < localStorage.length; i++) {
        var key = localStorage.key(i);
        if (key && key.indexOf(PREFIX) === 0) keys.push(key.substring(PREFIX.length));
      }
    } catch (e) {
      console.warn('[GM_listValues] Error:', e);
      return [];
    }
    return keys;
  };

  window.GM_addStyle = function(css) {
    var style = document.createElement('style');
    style.textContent = css;
    (document.head || document.documentElement).appendChild(style);
    return style;
  };
  window.GM_openInTab = function(url) {
    return window.open(url, '_blank');
  };

  window.GM_xmlhttpRequest = function(details) {
    var xhr = new XMLHttpRequest();
    var fail = function(handler, error) {
      if (details[handler]) details[handler](error);
      else if (details.onerror) details.onerror(error);
    };
    try {
      xhr.open(details.method || 'GET', details.url, true);
      if (details.headers) {
        Object.keys(details.headers).forEach(function(name) {
          xhr.setRequestHeader(name, details.headers[name]);
        });
      }
      if (details.timeout) xhr.timeout = details.timeout;
      if (details.responseType) xhr.responseType = details.responseType;
    } catch (e) {
      fail('onerror', e);
      return { abort: function() {} };
    }

    xhr.onload = function() {
      if (!details.onload) return;
      details.onload({
        finalUrl: xhr.responseURL || details.url,
        readyState: xhr.readyState,
        status: xhr.status,
        statusText: xhr.statusText,
        response: xhr.response,
        responseText: xhr.responseType === '' || !xhr.responseType ? xhr.responseText : undefined,
        responseHeaders: xhr.getAllResponseHeaders()
      });
    };
    xhr.onerror = function() { fail('onerror', xhr); };
    xhr.ontimeout = function() { fail('ontimeout', xhr); };

    try {
      xhr.send(details.data === undefined ? null : details.data);
    } catch (e) {
      fail('onerror', e);
    }
    return { abort: function() { xhr.abort(); } };
  };

  window.GM = {
    info: window.GM_info,
    getValue: function(key, defaultValue) {
      return Promise.resolve(window.GM_getValue(key, defaultValue));
    },
    setValue: function(key, value) {
      return Promise.resolve(window.GM_setValue(key, value));
    },
    deleteValue: function(key) {
      return Promise.resolve(window.GM_deleteValue(key));
    },
    listValues: function() {
      return Promise.resolve(window.GM_listValues());
    },
    addStyle: function(css) {
      return Promise.resolve(window.GM_addStyle(css));
    },
    openInTab: function(url) {
      return Promise.resolve(window.GM_openInTab(url));
    },
    xmlHttpRequest: function(details) {
      return new Promise(function(resolve, reject) {
        var request = Object.assign({}, details, {
          onload: function(response) {
            if (details.onload) details.onload(response);
            resolve(response);
          },
          onerror: function(error) {
            if (details.onerror) details.onerror(error);
            reject(error);
          },
          ontimeout: function(error) {
            if (details.ontimeout) details.ontimeout(error);
            reject(error);
          }
        });
        window.GM_xmlhttpRequest(request);
      });
    }
  };
})();
"#;

/// The shim source for this build of the launcher.
pub fn shim_source() -> String {
    SHIM_TEMPLATE
        .replace("__PREFIX__", STORAGE_PREFIX)
        .replace("__HANDLER__", HANDLER_NAME)
        .replace("__VERSION__", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_guarded_and_namespaced() {
        let source = shim_source();
        assert!(source.starts_with("(function() {\n  if (window.__userscriptLauncherShim) return;"));
        assert!(source.contains("var PREFIX = 'gm_';"));
        assert!(source.contains(env!("CARGO_PKG_VERSION")));
        assert!(!source.contains("__PREFIX__"));
        assert!(!source.contains("__VERSION__"));
    }
}
