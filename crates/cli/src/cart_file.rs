//! YAML cart snapshots.

use std::path::{Path, PathBuf};

use deliverly_client::{Cart, CartLineItem};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CartFileError {
    #[error("Failed to read cart file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid cart file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// On-disk cart layout.
#[derive(Debug, Deserialize)]
struct CartFile {
    #[serde(default)]
    items: Vec<CartLineItem>,
}

/// Parse a cart snapshot. Duplicate lines are merged.
pub fn parse(content: &str) -> Result<Cart, serde_yaml::Error> {
    let file: CartFile = serde_yaml::from_str(content)?;
    Ok(Cart::from_items(file.items))
}

/// Read a cart snapshot from disk.
pub async fn load(path: &Path) -> Result<Cart, CartFileError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CartFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let cart = parse(&content).map_err(|source| CartFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    info!(
        path = %path.display(),
        lines = cart.len(),
        total = %cart.total(),
        "Loaded cart"
    );
    Ok(cart)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use deliverly_core::{Money, ProductId};

    #[test]
    fn test_parse_merges_duplicates() {
        let cart = parse(
            r"
items:
  - product_id: 1
    store_id: 2
    name: Plov
    price: 300
    quantity: 2
  - product_id: 1
    store_id: 2
    name: Plov
    price: 300
  - product_id: 5
    store_id: 2
    name: Tea
    price: 50
    quantity: 0
",
        )
        .unwrap();

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.total(), Money::new(900));
        assert!(cart.contains_any(&[ProductId::new(1)]));
    }

    #[test]
    fn test_parse_empty_file() {
        let cart = parse("{}").unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_price() {
        assert!(parse("items:\n  - product_id: 1\n    store_id: 2\n    name: Plov\n").is_err());
    }

    #[tokio::test]
    async fn test_fixture_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/cart.yaml");
        let cart = load(&path).await.unwrap();
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.total(), Money::new(720));
    }
}
