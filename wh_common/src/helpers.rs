use std::{env, fmt::Display, str::FromStr};

/// Reads `name` from the environment and parses it. Missing or unparseable values fall back to `default`; the
/// second element of the result carries a human-readable reason when that happens, so that callers can log it in
/// their own style.
pub fn parse_env_or<T>(name: &str, default: T) -> (T, Option<String>)
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => match s.trim().parse::<T>() {
            Ok(v) => (v, None),
            Err(e) => (default, Some(format!("{s} is not a valid value for {name}. {e}"))),
        },
        Err(_) => {
            let reason = format!("{name} is not set. Using the default value of {default}");
            (default, Some(reason))
        },
    }
}
