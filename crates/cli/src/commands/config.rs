use std::fs;
use std::path::{Path, PathBuf};

use storerank_core::config::{read_env, resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run(config_path: Option<PathBuf>) -> String {
    let config = match AppConfig::load(LoadOptions {
        config_path: config_path.clone(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };
    let source = |key_path: &str, env_key: &str| sources(key_path, &[env_key]);

    let ranking = &config.ranking;
    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];

    lines.push(render_line(
        "ranking.mode",
        ranking.mode.as_str(),
        source("ranking.mode", "STORERANK_RANKING_MODE"),
    ));
    lines.push(render_line(
        "ranking.estimator",
        ranking.estimator.as_str(),
        source("ranking.estimator", "STORERANK_RANKING_ESTIMATOR"),
    ));
    lines.push(render_line(
        "ranking.min_store_samples",
        &ranking.min_store_samples.to_string(),
        source("ranking.min_store_samples", "STORERANK_RANKING_MIN_STORE_SAMPLES"),
    ));
    lines.push(render_line(
        "ranking.min_category_samples",
        &ranking.min_category_samples.to_string(),
        source("ranking.min_category_samples", "STORERANK_RANKING_MIN_CATEGORY_SAMPLES"),
    ));
    lines.push(render_line(
        "ranking.top_categories_per_store",
        &ranking.top_categories_per_store.to_string(),
        source("ranking.top_categories_per_store", "STORERANK_RANKING_TOP_CATEGORIES_PER_STORE"),
    ));
    lines.push(render_line(
        "ranking.top_stores_per_category",
        &ranking.top_stores_per_category.to_string(),
        source("ranking.top_stores_per_category", "STORERANK_RANKING_TOP_STORES_PER_CATEGORY"),
    ));
    lines.push(render_line(
        "ranking.shards",
        &ranking.shards.to_string(),
        source("ranking.shards", "STORERANK_RANKING_SHARDS"),
    ));

    lines.push(render_line(
        "exclusions.stores",
        &render_list(config.exclusions.stores.iter().map(|store| store.as_str())),
        source("exclusions.stores", "STORERANK_EXCLUDED_STORES"),
    ));
    lines.push(render_line(
        "exclusions.categories",
        &render_list(config.exclusions.categories.iter().map(|category| category.as_str())),
        source("exclusions.categories", "STORERANK_EXCLUDED_CATEGORIES"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        sources("logging.level", &["STORERANK_LOGGING_LEVEL", "STORERANK_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        config.logging.format.as_str(),
        sources("logging.format", &["STORERANK_LOGGING_FORMAT", "STORERANK_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| read_env(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn render_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let items: Vec<&str> = items.collect();
    if items.is_empty() {
        return "<none>".to_string();
    }
    items.join(", ")
}
