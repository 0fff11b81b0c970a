//! 🎬 Mock data: a movie and three employees walk into a cluster.
//!
//! Before you migrate anything real, migrate something you can recognise on the
//! other side. One `movies` document (Moneyball, naturally) and a tiny `corp`
//! index with three people and their hobbies. If they survive snapshot, restore,
//! and two major upgrades, your data probably will too.
//!
//! ⚠️ Old clusters want a mapping type in the URL (`doc`, `employee`). Newer ones
//! only accept `_doc`. `typeless` picks the second dialect.

use anyhow::Result;
use serde_json::{Value, json};
use tracing::info;

use crate::cluster::ClusterClient;

/// 📄 One document to plant.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedDocument {
    pub index: &'static str,
    pub doc_type: &'static str,
    pub id: u32,
    pub body: Value,
}

impl SeedDocument {
    fn path(&self, typeless: bool) -> String {
        let doc_type = if typeless { "_doc" } else { self.doc_type };
        format!("/{}/{}/{}", self.index, doc_type, self.id)
    }
}

/// 🍿 The fixture.
pub fn fixture() -> Vec<SeedDocument> {
    let mut documents = vec![SeedDocument {
        index: "movies",
        doc_type: "doc",
        id: 10,
        body: json!({ "title": "Moneyball", "director": "Bennett Miller", "year": "2011" }),
    }];

    let employees = [
        json!({
            "first_name": "nitin",
            "last_name": "panwar",
            "age": 27,
            "about": "Love to play cricket",
            "interests": ["sports", "music"],
        }),
        json!({
            "first_name": "Jane",
            "last_name": "Smith",
            "age": 32,
            "about": "I like to collect rock albums",
            "interests": ["music"],
        }),
        json!({
            "first_name": "Douglas",
            "last_name": "Fir",
            "age": 35,
            "about": "I like to build cabinets",
            "interests": ["forestry"],
        }),
    ];
    documents.extend(employees.into_iter().zip(1..).map(|(body, id)| SeedDocument {
        index: "corp",
        doc_type: "employee",
        id,
        body,
    }));
    documents
}

/// 🌱 Index every fixture document, then read each one back. Returns what was read.
pub async fn seed(client: &ClusterClient, typeless: bool) -> Result<Vec<Value>> {
    info!("🌱 Seeding sample documents into {}", client.base_url());
    let mut fetched = Vec::new();

    for document in fixture() {
        let path = document.path(typeless);
        client
            .put_json(&path, &document.body)
            .await?
            .ensure_success(&format!("Indexing {path}"))?;

        let stored: Value = client
            .get(&path)
            .await?
            .ensure_success(&format!("Reading back {path}"))?
            .json()?;
        info!("📄 {}", stored);
        fetched.push(stored);
    }

    info!("✅ Seeded {} documents", fetched.len());
    Ok(fetched)
}
