use std::path::Path;

use storerank_core::Facets;

use crate::commands::{load_catalog, CommandResult, EXIT_INPUT};

pub fn run(input: &Path) -> CommandResult {
    let pages = match load_catalog(input) {
        Ok(pages) => pages,
        Err(error) => {
            return CommandResult::failure("facets", "catalog_input", format!("{error:#}"), EXIT_INPUT);
        }
    };

    let facets = Facets::from_pages(&pages);
    let message =
        format!("{} categories, {} stores", facets.categories.len(), facets.stores.len());
    CommandResult::success_with("facets", "ok", message, &facets)
}
