//! Command implementations for the commish CLI

pub mod auth_url;
pub mod recap;


/// Flag value first, then the environment; blank counts as missing.
fn resolve(flag: Option<String>, env_var: &str) -> Option<String> {
    resolve_with(flag, env_var, |key| std::env::var(key).ok())
}

fn resolve_with<F>(flag: Option<String>, env_var: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    flag.filter(|v| !v.trim().is_empty())
        .or_else(|| lookup(env_var).filter(|v| !v.trim().is_empty()))
}
