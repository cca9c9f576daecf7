//! Database schema and operations

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;

use crate::calculator::active_additives;
use crate::models::{
    AdditiveEntry, FattyAcidProfile, FormulationResult, OilLine, OilSpec, RecipeInput, SavedRecipe,
};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Oil reference table
        CREATE TABLE IF NOT EXISTS oils (
            name TEXT PRIMARY KEY,
            sap REAL NOT NULL,
            ins REAL NOT NULL,
            lauric REAL NOT NULL DEFAULT 0,
            myristic REAL NOT NULL DEFAULT 0,
            palmitic REAL NOT NULL DEFAULT 0,
            stearic REAL NOT NULL DEFAULT 0,
            ricinoleic REAL NOT NULL DEFAULT 0,
            oleic REAL NOT NULL DEFAULT 0,
            linoleic REAL NOT NULL DEFAULT 0,
            linolenic REAL NOT NULL DEFAULT 0
        );

        -- Saved recipes, one JSON document each, in save order
        CREATE TABLE IF NOT EXISTS recipes (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recipes_position ON recipes(position);
        "#,
    )?;
    Ok(())
}

/// Insert or replace an oil
pub fn upsert_oil(conn: &Connection, oil: &OilSpec) -> Result<()> {
    let fa = &oil.fatty_acids;
    conn.execute(
        "INSERT OR REPLACE INTO oils
            (name, sap, ins, lauric, myristic, palmitic, stearic, ricinoleic, oleic, linoleic, linolenic)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        (
            &oil.name,
            oil.sap,
            oil.ins,
            fa.lauric,
            fa.myristic,
            fa.palmitic,
            fa.stearic,
            fa.ricinoleic,
            fa.oleic,
            fa.linoleic,
            fa.linolenic,
        ),
    )?;
    Ok(())
}

/// Clear the oil reference table (for re-import)
pub fn clear_oils(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM oils", [])?;
    Ok(())
}

const OIL_COLUMNS: &str =
    "name, sap, ins, lauric, myristic, palmitic, stearic, ricinoleic, oleic, linoleic, linolenic";

fn oil_from_row(row: &Row<'_>) -> rusqlite::Result<OilSpec> {
    Ok(OilSpec {
        name: row.get(0)?,
        sap: row.get(1)?,
        ins: row.get(2)?,
        fatty_acids: FattyAcidProfile {
            lauric: row.get(3)?,
            myristic: row.get(4)?,
            palmitic: row.get(5)?,
            stearic: row.get(6)?,
            ricinoleic: row.get(7)?,
            oleic: row.get(8)?,
            linoleic: row.get(9)?,
            linolenic: row.get(10)?,
        },
    })
}

/// Look up one oil by its exact name
pub fn get_oil(conn: &Connection, name: &str) -> Result<Option<OilSpec>> {
    let sql = format!("SELECT {} FROM oils WHERE name = ?1", OIL_COLUMNS);
    let oil = conn.query_row(&sql, [name], oil_from_row).optional()?;
    Ok(oil)
}

/// List all oils in the database
pub fn list_oils(conn: &Connection) -> Result<Vec<OilSpec>> {
    let sql = format!("SELECT {} FROM oils ORDER BY name", OIL_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], oil_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Load-all / save-all persistence for saved recipes
pub trait RecipeStore {
    fn load_all(&self) -> Result<Vec<SavedRecipe>>;
    fn save_all(&self, recipes: &[SavedRecipe]) -> Result<()>;
}

/// Recipe store in the `recipes` table
pub struct SqliteRecipeStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecipeStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RecipeStore for SqliteRecipeStore<'_> {
    fn load_all(&self) -> Result<Vec<SavedRecipe>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM recipes ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            let recipe = decode_recipe(&payload)
                .with_context(|| format!("Malformed stored recipe {}", id))?;
            results.push(recipe);
        }
        Ok(results)
    }

    fn save_all(&self, recipes: &[SavedRecipe]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM recipes", [])?;
        for (position, recipe) in recipes.iter().enumerate() {
            tx.execute(
                "INSERT INTO recipes (id, position, name, payload) VALUES (?1, ?2, ?3, ?4)",
                (
                    &recipe.id,
                    position as i64,
                    &recipe.name,
                    serde_json::to_string(recipe)?,
                ),
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Stored recipe document, including fields written by older versions
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecipe {
    id: String,
    name: String,
    oils: Vec<OilLine>,
    superfat: f64,
    #[serde(default)]
    water_as_percent_of_oils: f64,
    #[serde(default)]
    essential_oils: Vec<AdditiveEntry>,
    #[serde(default)]
    powders: Vec<AdditiveEntry>,
    // Single-amount additives from before named entries existed
    #[serde(default)]
    essential_oil_weight: f64,
    #[serde(default)]
    powder_weight: f64,
    results: FormulationResult,
}

fn upgrade_additives(
    entries: Vec<AdditiveEntry>,
    legacy_weight: f64,
    legacy_name: &str,
) -> Vec<AdditiveEntry> {
    if entries.is_empty() && legacy_weight > 0.0 {
        vec![AdditiveEntry::new(legacy_name, legacy_weight)]
    } else {
        entries
    }
}

pub fn decode_recipe(payload: &str) -> Result<SavedRecipe> {
    let stored: StoredRecipe = serde_json::from_str(payload)?;
    Ok(SavedRecipe {
        id: stored.id,
        name: stored.name,
        oils: stored.oils,
        superfat: stored.superfat,
        water_as_percent_of_oils: stored.water_as_percent_of_oils,
        essential_oils: upgrade_additives(
            stored.essential_oils,
            stored.essential_oil_weight,
            "Essential oil",
        ),
        powders: upgrade_additives(stored.powders, stored.powder_weight, "Natural powder"),
        results: stored.results,
    })
}

/// In-memory list of saved recipes, persisted best-effort
pub struct RecipeBook<S: RecipeStore> {
    store: S,
    recipes: Vec<SavedRecipe>,
}

impl<S: RecipeStore> RecipeBook<S> {
    /// Load saved recipes; an unreadable store gives an empty book
    pub fn open(store: S) -> Self {
        let recipes = store.load_all().unwrap_or_else(|e| {
            log::error!("Failed to load saved recipes: {:#}", e);
            Vec::new()
        });
        Self { store, recipes }
    }

    pub fn recipes(&self) -> &[SavedRecipe] {
        &self.recipes
    }

    pub fn find(&self, id: &str) -> Option<&SavedRecipe> {
        self.recipes.iter().find(|r| r.id == id)
    }

    fn persist(&self, action: &str) -> Result<()> {
        self.store.save_all(&self.recipes).inspect_err(|e| {
            log::error!("Failed to {} recipe: {:#}", action, e);
        })
    }

    /// Save the working recipe together with the result shown for it
    ///
    /// The recipe stays in the book even when writing the store fails; the
    /// error is returned so the caller can tell the user it wasn't kept.
    pub fn save(
        &mut self,
        name: &str,
        input: &RecipeInput,
        result: &FormulationResult,
    ) -> Result<&SavedRecipe> {
        let recipe = SavedRecipe {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            oils: input.oils.clone(),
            superfat: input.superfat,
            water_as_percent_of_oils: input.water_percent,
            essential_oils: active_additives(&input.essential_oils),
            powders: active_additives(&input.powders),
            results: result.clone(),
        };
        log::info!("Saving recipe '{}' as {}", recipe.name, recipe.id);

        self.recipes.push(recipe);
        self.persist("save")?;
        Ok(&self.recipes[self.recipes.len() - 1])
    }

    /// Delete a recipe by id; returns false when no such recipe exists
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.recipes.len();
        self.recipes.retain(|r| r.id != id);
        if self.recipes.len() == before {
            return false;
        }

        // Best-effort; already logged
        let _ = self.persist("delete");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::formulate;
    use std::cell::RefCell;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn olive() -> OilSpec {
        OilSpec {
            name: "Olive Oil".to_string(),
            sap: 0.135,
            ins: 109.0,
            fatty_acids: FattyAcidProfile {
                palmitic: 14.0,
                stearic: 3.0,
                oleic: 69.0,
                linoleic: 12.0,
                linolenic: 1.0,
                ..Default::default()
            },
        }
    }

    fn input() -> RecipeInput {
        RecipeInput {
            oils: vec![OilLine {
                oil: olive(),
                weight: 1000.0,
            }],
            superfat: 5.0,
            water_percent: 33.0,
            essential_oils: vec![
                AdditiveEntry::new("Lavender", 20.0),
                AdditiveEntry::new(" ", 4.0),
            ],
            powders: vec![AdditiveEntry::new("Pink clay", 0.0)],
        }
    }

    /// Store that keeps the last written list, or refuses every call
    struct MemoryStore {
        saved: RefCell<Vec<SavedRecipe>>,
        broken: bool,
    }

    impl MemoryStore {
        fn new(broken: bool) -> Self {
            Self {
                saved: RefCell::new(Vec::new()),
                broken,
            }
        }
    }

    impl RecipeStore for &MemoryStore {
        fn load_all(&self) -> Result<Vec<SavedRecipe>> {
            if self.broken {
                anyhow::bail!("store offline");
            }
            Ok(self.saved.borrow().clone())
        }

        fn save_all(&self, recipes: &[SavedRecipe]) -> Result<()> {
            if self.broken {
                anyhow::bail!("store offline");
            }
            *self.saved.borrow_mut() = recipes.to_vec();
            Ok(())
        }
    }

    #[test]
    fn oils_round_trip_through_table() {
        let conn = memory_db();
        upsert_oil(&conn, &olive()).unwrap();

        assert_eq!(get_oil(&conn, "Olive Oil").unwrap(), Some(olive()));
        assert_eq!(get_oil(&conn, "olive oil").unwrap(), None);
        assert_eq!(list_oils(&conn).unwrap().len(), 1);

        clear_oils(&conn).unwrap();
        assert!(list_oils(&conn).unwrap().is_empty());
    }

    #[test]
    fn empty_store_opens_empty_book() {
        let conn = memory_db();
        let book = RecipeBook::open(SqliteRecipeStore::new(&conn));
        assert!(book.recipes().is_empty());
    }

    #[test]
    fn saved_recipe_reloads_identically() {
        let conn = memory_db();
        let input = input();
        let result = formulate(&input, "A mild castile bar").unwrap();

        let saved = {
            let mut book = RecipeBook::open(SqliteRecipeStore::new(&conn));
            book.save("Castile", &input, &result).unwrap().clone()
        };

        assert_eq!(saved.essential_oils, result.essential_oils);
        assert_eq!(saved.powders, result.powders);
        assert_eq!(saved.essential_oils.len(), 1);

        let reopened = RecipeBook::open(SqliteRecipeStore::new(&conn));
        let loaded = reopened.find(&saved.id).unwrap();
        assert_eq!(loaded, &saved);
        assert_eq!(loaded.results, result);
    }

    #[test]
    fn save_order_is_kept_and_delete_removes_one() {
        let conn = memory_db();
        let input = input();
        let result = formulate(&input, "").unwrap();

        let mut book = RecipeBook::open(SqliteRecipeStore::new(&conn));
        let first = book.save("First", &input, &result).unwrap().id.clone();
        let second = book.save("Second", &input, &result).unwrap().id.clone();
        book.save("Third", &input, &result).unwrap();
        assert_ne!(first, second);

        assert!(book.delete(&second));
        assert!(!book.delete(&second));

        let reopened = RecipeBook::open(SqliteRecipeStore::new(&conn));
        let names: Vec<&str> = reopened.recipes().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Third"]);
    }

    #[test]
    fn malformed_store_falls_back_to_empty() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO recipes (id, position, name, payload) VALUES ('x', 0, 'Broken', '{not json')",
            [],
        )
        .unwrap();

        assert!(SqliteRecipeStore::new(&conn).load_all().is_err());
        let book = RecipeBook::open(SqliteRecipeStore::new(&conn));
        assert!(book.recipes().is_empty());
    }

    #[test]
    fn failed_persistence_keeps_memory_consistent() {
        let store = MemoryStore::new(true);
        let input = input();
        let result = formulate(&input, "").unwrap();

        let mut book = RecipeBook::open(&store);
        assert!(book.save("Offline", &input, &result).is_err());
        assert_eq!(book.recipes().len(), 1);
        let id = book.recipes()[0].id.clone();
        assert!(book.delete(&id));
        assert!(book.recipes().is_empty());
    }

    #[test]
    fn working_store_receives_full_list() {
        let store = MemoryStore::new(false);
        let input = input();
        let result = formulate(&input, "").unwrap();

        let mut book = RecipeBook::open(&store);
        book.save("One", &input, &result).unwrap();
        book.save("Two", &input, &result).unwrap();
        assert_eq!(store.saved.borrow().len(), 2);
    }

    #[test]
    fn legacy_additive_weights_are_upgraded() {
        let result = formulate(&input(), "old").unwrap();
        let payload = serde_json::json!({
            "id": "legacy-1",
            "name": "Old recipe",
            "oils": [{ "oil": olive(), "weight": 1000.0 }],
            "superfat": 6.0,
            "essentialOilWeight": 25.0,
            "powderWeight": 0.0,
            "results": result,
        });

        let recipe = decode_recipe(&payload.to_string()).unwrap();
        assert_eq!(recipe.essential_oils, vec![AdditiveEntry::new("Essential oil", 25.0)]);
        assert!(recipe.powders.is_empty());
        assert_eq!(recipe.water_as_percent_of_oils, 0.0);
        assert_eq!(recipe.to_input().water_percent, 33.0);
        assert_eq!(recipe.results, result);
    }

    #[test]
    fn next_save_writes_legacy_records_back_upgraded() {
        let conn = memory_db();
        let result = formulate(&input(), "old").unwrap();
        let payload = serde_json::json!({
            "id": "legacy-1",
            "name": "Old recipe",
            "oils": [{ "oil": olive(), "weight": 1000.0 }],
            "superfat": 6.0,
            "essentialOilWeight": 25.0,
            "results": result,
        });
        conn.execute(
            "INSERT INTO recipes (id, position, name, payload) VALUES ('legacy-1', 0, 'Old recipe', ?1)",
            [payload.to_string()],
        )
        .unwrap();

        let mut book = RecipeBook::open(SqliteRecipeStore::new(&conn));
        book.save("New", &input(), &result).unwrap();

        let stored: String = conn
            .query_row("SELECT payload FROM recipes WHERE id = 'legacy-1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert!(stored.get("essentialOilWeight").is_none());
        assert_eq!(stored["essentialOils"][0]["name"], "Essential oil");
        assert_eq!(stored["essentialOils"][0]["weight"], 25.0);
    }
}
