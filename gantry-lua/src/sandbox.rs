//! Lua sandbox creation
//!
//! Pipeline documents are plain Lua that return a table. They are evaluated
//! in a restricted sandbox with no I/O, no `os`, no module loading, so a
//! document can only describe a pipeline, never act on the host.
//!
//! The `pipeline` helper module is always injected. It offers passthrough
//! constructors (`pipeline.define`, `pipeline.stage`, `pipeline.step`) and a
//! fluent builder (`pipeline.builder()`).

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};

/// Create a restricted Lua sandbox
///
/// Only TABLE, STRING, MATH and COROUTINE are loaded; IO, OS, PACKAGE and
/// DEBUG are not. `require`, `dofile`, `loadfile` and `load` are removed.
///
/// # Example
/// ```no_run
/// use gantry_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let pipeline_table: mlua::Table = lua
///     .load(r#"return pipeline.define { name = "web", stages = {} }"#)
///     .eval()?;
/// let name: String = pipeline_table.get("name")?;
/// assert_eq!(name, "web");
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
            LuaOptions::default(),
        )
    };

    let globals = lua.globals();
    for name in ["require", "dofile", "loadfile", "load"] {
        globals.set(name, mlua::Nil)?;
    }

    register_pipeline_module(&lua)?;

    Ok(lua)
}

/// Register the `pipeline` helper module
fn register_pipeline_module(lua: &Lua) -> LuaResult<()> {
    let pipeline = lua.create_table()?;

    // pipeline.define(definition) - returns the definition table as-is
    let define_fn = lua.create_function(|_, definition: Table| Ok(definition))?;
    pipeline.set("define", define_fn)?;

    // pipeline.stage(config) - returns the config table as-is
    let stage_fn = lua.create_function(|_, config: Table| Ok(config))?;
    pipeline.set("stage", stage_fn)?;

    // pipeline.step("cmd") or pipeline.step { run = "cmd", ... }
    let step_fn = lua.create_function(|lua, value: Value| match value {
        Value::String(command) => {
            let step = lua.create_table()?;
            step.set("run", command)?;
            Ok(step)
        }
        Value::Table(step) => Ok(step),
        other => Err(mlua::Error::RuntimeError(format!(
            "pipeline.step expects a command string or a table, got {}",
            other.type_name()
        ))),
    })?;
    pipeline.set("step", step_fn)?;

    // pipeline.cache(key, { files = ..., paths = ... })
    let cache_fn = lua.create_function(|lua, (key, options): (String, Option<Table>)| {
        let cache = match options {
            Some(options) => options,
            None => lua.create_table()?,
        };
        cache.set("key", key)?;
        Ok(cache)
    })?;
    pipeline.set("cache", cache_fn)?;

    let builder_fn = lua.create_function(|lua, ()| create_pipeline_builder(lua))?;
    pipeline.set("builder", builder_fn)?;

    lua.globals().set("pipeline", pipeline)?;

    Ok(())
}

/// Get a list field of the builder, creating it on first use
fn builder_list(lua: &Lua, builder: &Table, field: &str) -> LuaResult<Table> {
    match builder.get::<Option<Table>>(field)? {
        Some(list) => Ok(list),
        None => {
            let list = lua.create_table()?;
            builder.set(field, list.clone())?;
            Ok(list)
        }
    }
}

/// Create a pipeline builder instance with fluent API methods
///
/// ```lua
/// return pipeline.builder()
///     :name("web-app")
///     :push_branches({ "main" })
///     :stage { name = "lint", steps = { "make lint" } }
///     :build()
/// ```
fn create_pipeline_builder(lua: &Lua) -> LuaResult<Table> {
    let builder = lua.create_table()?;
    let metatable = lua.create_table()?;

    let name_fn = lua.create_function(|_, (builder, name): (Table, String)| {
        builder.set("_name", name)?;
        Ok(builder)
    })?;
    metatable.set("name", name_fn)?;

    let description_fn = lua.create_function(|_, (builder, desc): (Table, String)| {
        builder.set("_description", desc)?;
        Ok(builder)
    })?;
    metatable.set("description", description_fn)?;

    let push_fn = lua.create_function(|lua, (builder, branches): (Table, Table)| {
        let triggers = builder_list(lua, &builder, "_triggers")?;
        triggers.set("push", branches)?;
        Ok(builder)
    })?;
    metatable.set("push_branches", push_fn)?;

    let pr_fn = lua.create_function(|lua, (builder, enabled): (Table, bool)| {
        let triggers = builder_list(lua, &builder, "_triggers")?;
        triggers.set("pull_request", enabled)?;
        Ok(builder)
    })?;
    metatable.set("pull_requests", pr_fn)?;

    let stage_fn = lua.create_function(|lua, (builder, stage): (Table, Table)| {
        let stages = builder_list(lua, &builder, "_stages")?;
        stages.push(stage)?;
        Ok(builder)
    })?;
    metatable.set("stage", stage_fn)?;

    // build() converts builder to pipeline definition table
    let build_fn = lua.create_function(|lua, builder: Table| {
        let definition = lua.create_table()?;

        if let Some(name) = builder.get::<Option<String>>("_name")? {
            definition.set("name", name)?;
        }
        if let Some(desc) = builder.get::<Option<String>>("_description")? {
            definition.set("description", desc)?;
        }
        if let Some(triggers) = builder.get::<Option<Table>>("_triggers")? {
            definition.set("triggers", triggers)?;
        }
        if let Some(stages) = builder.get::<Option<Table>>("_stages")? {
            definition.set("stages", stages)?;
        }

        Ok(definition)
    })?;
    metatable.set("build", build_fn)?;

    // Set __index to the metatable itself so methods are accessible
    metatable.set("__index", metatable.clone())?;
    builder.set_metatable(Some(metatable))?;

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_basic_lua() {
        let lua = create_sandbox().unwrap();

        let result: i32 = lua
            .load(
                r#"
                local t = {a = 1, b = 2}
                return t.a + t.b
            "#,
            )
            .eval()
            .unwrap();
        assert_eq!(result, 3);

        let result: String = lua.load(r#"return string.upper("hello")"#).eval().unwrap();
        assert_eq!(result, "HELLO");
    }

    #[test]
    fn test_sandbox_no_io() {
        let lua = create_sandbox().unwrap();

        let has_io: bool = lua.load(r#"return io ~= nil"#).eval().unwrap();
        assert!(!has_io);

        let has_os: bool = lua.load(r#"return os ~= nil"#).eval().unwrap();
        assert!(!has_os);
    }

    #[test]
    fn test_sandbox_no_code_loading() {
        let lua = create_sandbox().unwrap();

        assert!(lua.load(r#"require("os")"#).exec().is_err());
        assert!(lua.load(r#"dofile("/etc/passwd")"#).exec().is_err());
        assert!(lua.load(r#"load("return 1")()"#).exec().is_err());
    }

    #[test]
    fn test_step_helper_accepts_string_or_table() {
        let lua = create_sandbox().unwrap();

        let run: String = lua
            .load(r#"return pipeline.step("npm test").run"#)
            .eval()
            .unwrap();
        assert_eq!(run, "npm test");

        let cwd: String = lua
            .load(r#"return pipeline.step({ run = "make", cwd = "backend" }).cwd"#)
            .eval()
            .unwrap();
        assert_eq!(cwd, "backend");

        assert!(lua.load("return pipeline.step(42)").exec().is_err());
    }

    #[test]
    fn test_cache_helper_sets_key() {
        let lua = create_sandbox().unwrap();

        let key: String = lua
            .load(r#"return pipeline.cache("npm", { paths = { "node_modules" } }).key"#)
            .eval()
            .unwrap();
        assert_eq!(key, "npm");

        let key: String = lua
            .load(r#"return pipeline.cache("plain").key"#)
            .eval()
            .unwrap();
        assert_eq!(key, "plain");
    }

    #[test]
    fn test_builder_produces_definition_table() {
        let lua = create_sandbox().unwrap();

        let definition: Table = lua
            .load(
                r#"
                return pipeline.builder()
                    :name("web")
                    :push_branches({ "trunk" })
                    :pull_requests(false)
                    :stage({ name = "lint", steps = { "make lint" } })
                    :stage({ name = "test", steps = { "make test" } })
                    :build()
            "#,
            )
            .eval()
            .unwrap();

        let name: String = definition.get("name").unwrap();
        assert_eq!(name, "web");

        let stages: Table = definition.get("stages").unwrap();
        assert_eq!(stages.raw_len(), 2);

        let triggers: Table = definition.get("triggers").unwrap();
        let pull_request: bool = triggers.get("pull_request").unwrap();
        assert!(!pull_request);
    }
}
