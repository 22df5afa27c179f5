//! Guest-language source generation.
//!
//! Everything spliced into guest code passes through here: identifiers are
//! validated, strings become escaped literals.

/// Quote `value` as a guest string literal.
///
/// JSON string escapes are a subset of Python's, so the JSON encoding is a
/// valid literal.
pub fn string_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Whether `name` is usable as a plain guest identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Whether `name` is a dotted module path (`pkg.sub.mod`).
pub fn is_module_path(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier)
}

/// Install one package through the package manager.
pub fn install(specifier: &str) -> String {
    format!(
        "import micropip\nawait micropip.install({})\n",
        string_literal(specifier)
    )
}

/// Import `entrypoint` from `module` and call it.
pub fn import_and_call(module: &str, entrypoint: &str) -> String {
    format!("from {module} import {entrypoint} as _tincture_entry\n_tincture_entry()\n")
}

/// Marker the name-lookup snippet carries.
pub const CALL_MARKER: &str = "_tincture_call";

/// Call the first attribute named `entrypoint` found on `modules`, searched in order.
///
/// Evaluates to JSON `{"module": "<where it was found>" | null}`; nothing is
/// called when the name is not found.
pub fn call_by_name(modules: &[String], entrypoint: &str) -> String {
    format!(
        "import importlib, json\n\
         importlib.invalidate_caches()\n\
         def {CALL_MARKER}(names, entry):\n\
         \x20   for name in names:\n\
         \x20       module = importlib.import_module(name)\n\
         \x20       if hasattr(module, entry):\n\
         \x20           getattr(module, entry)()\n\
         \x20           return json.dumps({{\"module\": name}})\n\
         \x20   return json.dumps({{\"module\": None}})\n\
         {CALL_MARKER}([{names}], {entry})\n",
        names = list_literal(modules),
        entry = string_literal(entrypoint),
    )
}

fn list_literal(items: &[String]) -> String {
    items
        .iter()
        .map(|m| string_literal(m))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Marker the discovery snippet carries; lets hosts recognize it.
pub const INSPECT_MARKER: &str = "_tincture_inspect";

/// Describe `modules` as JSON: the registered entry point, if any, and every
/// class with the names of its direct bases, in definition order.
///
/// Output shape:
/// `{"modules": [{"module": "pkg", "registered": "App" | null,
///   "classes": [{"name": "App", "bases": ["MainWindow"]}]}]}`
pub fn inspect(modules: &[String]) -> String {
    let names = list_literal(modules);
    format!(
        "import importlib, inspect, json\n\
         importlib.invalidate_caches()\n\
         def {INSPECT_MARKER}(names):\n\
         \x20   described = []\n\
         \x20   for name in names:\n\
         \x20       module = importlib.import_module(name)\n\
         \x20       registered = getattr(module, \"__entrypoint__\", None)\n\
         \x20       if registered is not None and not isinstance(registered, str):\n\
         \x20           registered = getattr(registered, \"__name__\", None)\n\
         \x20       classes = [\n\
         \x20           {{\"name\": n, \"bases\": [b.__name__ for b in obj.__bases__]}}\n\
         \x20           for n, obj in vars(module).items()\n\
         \x20           if inspect.isclass(obj) and getattr(obj, \"__module__\", None) == module.__name__\n\
         \x20       ]\n\
         \x20       described.append({{\"module\": name, \"registered\": registered, \"classes\": classes}})\n\
         \x20   return json.dumps({{\"modules\": described}})\n\
         {INSPECT_MARKER}([{names}])\n"
    )
}
