use std::fmt::Debug;

use lazy_static::lazy_static;
use serde::Serialize;

const LOG_DIRECTIVES_VAR: &str = "RUST_LOG";

lazy_static! {
    pub static ref RUST_LOG_JSON: bool = std::env::var("RUST_LOG_JSON").is_ok();
}

/// Sets up logging from `RUST_LOG`. Logging stays off when it is unset.
pub fn init() {
    match std::env::var(LOG_DIRECTIVES_VAR) {
        Ok(directives) => init_with_directives(&directives),
        Err(_) => eprintln!("Logging disabled, set {LOG_DIRECTIVES_VAR} to enable it"),
    }
}

pub fn init_with_directives(directives: &str) {
    eprintln!("Logging enabled with directives: {directives}");
    let result = pretty_env_logger::formatted_timed_builder()
        .parse_filters(directives)
        .format_timestamp_millis()
        .try_init();
    if let Err(err) = result {
        eprintln!("Logger already initialized: {err}");
    }
}

/// Pretty JSON when `RUST_LOG_JSON` is set, `Debug` otherwise.
pub fn pretty_json<T: Serialize + Debug>(value: &T) -> String {
    render(value, *RUST_LOG_JSON)
}

fn render<T: Serialize + Debug>(value: &T, as_json: bool) -> String {
    if !as_json {
        return format!("{value:?}");
    }
    serde_json::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize, Debug)]
    struct Summary {
        eon: u64,
    }

    #[test]
    fn test_render() {
        let summary = Summary { eon: 3 };
        assert_eq!(render(&summary, false), "Summary { eon: 3 }");
        assert_eq!(render(&summary, true), "{\n  \"eon\": 3\n}");
    }
}
