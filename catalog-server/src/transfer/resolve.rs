//! Case-insensitive name to id resolution for imports.
//!
//! The whole taxonomy is loaded once per import request; lookups are
//! then pure map hits. Team names are only unique within a function, so
//! they key on the pair.

use std::collections::HashMap;

use catalog_common::Result;
use sqlx::SqlitePool;

use crate::store::taxonomy;

pub struct NameResolver {
    functions: HashMap<String, i64>,
    teams: HashMap<(i64, String), i64>,
    tools: HashMap<String, i64>,
    capabilities: HashMap<String, i64>,
}

impl NameResolver {
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let functions = taxonomy::list_functions(pool, false)
            .await?
            .into_iter()
            .map(|f| (f.name.to_lowercase(), f.id))
            .collect();
        let teams = taxonomy::list_teams(pool, None, false)
            .await?
            .into_iter()
            .map(|t| ((t.function_id, t.name.to_lowercase()), t.id))
            .collect();
        let tools = taxonomy::list_tools(pool, false)
            .await?
            .into_iter()
            .map(|t| (t.name.to_lowercase(), t.id))
            .collect();
        let capabilities = taxonomy::list_capabilities(pool, false)
            .await?
            .into_iter()
            .map(|c| (c.name.to_lowercase(), c.id))
            .collect();
        Ok(Self { functions, teams, tools, capabilities })
    }

    pub fn function(&self, name: &str) -> Option<i64> {
        self.functions.get(&name.trim().to_lowercase()).copied()
    }

    pub fn team(&self, function_id: i64, name: &str) -> Option<i64> {
        self.teams
            .get(&(function_id, name.trim().to_lowercase()))
            .copied()
    }

    pub fn tool(&self, name: &str) -> Option<i64> {
        self.tools.get(&name.trim().to_lowercase()).copied()
    }

    pub fn capability(&self, name: &str) -> Option<i64> {
        self.capabilities.get(&name.trim().to_lowercase()).copied()
    }
}
