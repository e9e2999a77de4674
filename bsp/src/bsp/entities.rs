use glam::Vec3;
use serde::Serialize;

use crate::error::{BSPError, Result};

const QUOTE: u8 = b'"';
const START_BRACKET: u8 = b'{';
const END_BRACKET: u8 = b'}';

/// One `{ "key" "value" ... }` block, keys in file order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Entity {
    pub properties: Vec<(String, String)>,
}

impl Entity {
    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn classname(&self) -> Option<&str> {
        self.get("classname")
    }

    pub fn origin(&self) -> Option<Vec3> {
        let mut parts = self.get("origin")?.split_whitespace().map(str::parse::<f32>);
        let v = Vec3::new(
            parts.next()?.ok()?,
            parts.next()?.ok()?,
            parts.next()?.ok()?,
        );
        Some(v)
    }

    /// Brush model index for `"model" "*N"`.
    pub fn brush_model(&self) -> Option<usize> {
        self.get("model")?.strip_prefix('*')?.parse().ok()
    }

    /// Texture archives listed by a GoldSrc worldspawn, without their directories.
    pub fn wads(&self) -> Vec<String> {
        self.get("wad")
            .map(|list| {
                list.split(';')
                    .filter(|w| !w.trim().is_empty())
                    .map(|w| {
                        let w = w.trim().replace('\\', "/");
                        w.rsplit('/').next().unwrap_or_default().to_ascii_lowercase()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(PartialEq, Eq, Debug)]
enum ParseState {
    OutsideEntity,
    InsideEntity,
    InKey,
    AfterKey,
    InValue,
}

/// Parse the entity lump text.
pub fn parse_entities(data: &[u8], lump: &str) -> Result<Vec<Entity>> {
    use ParseState::*;

    let mut entities = Vec::new();
    let mut current = Entity::default();
    let mut state = OutsideEntity;
    let (mut key_start, mut key_end, mut val_start) = (0, 0, 0);

    let text = |from: usize, to: usize| String::from_utf8_lossy(&data[from..to]).into_owned();
    let invalid = |offset: usize, reason: &'static str| {
        BSPError::corrupt(lump, offset, 0, data[offset] as usize, reason)
    };

    for (i, &chr) in data.iter().enumerate() {
        match (chr, &state) {
            (0, OutsideEntity) => break,
            (QUOTE, InsideEntity) => {
                state = InKey;
                key_start = i + 1;
            }
            (QUOTE, InKey) => {
                state = AfterKey;
                key_end = i;
            }
            (QUOTE, AfterKey) => {
                state = InValue;
                val_start = i + 1;
            }
            (QUOTE, InValue) => {
                state = InsideEntity;
                current
                    .properties
                    .push((text(key_start, key_end), text(val_start, i)));
            }
            (QUOTE, OutsideEntity) => return Err(invalid(i, "quote outside of entity")),
            (START_BRACKET, OutsideEntity) => state = InsideEntity,
            (START_BRACKET, InsideEntity | AfterKey) => {
                return Err(invalid(i, "nested entity"))
            }
            (END_BRACKET, InsideEntity) => {
                state = OutsideEntity;
                entities.push(std::mem::take(&mut current));
            }
            (END_BRACKET, OutsideEntity | AfterKey) => {
                return Err(invalid(i, "unbalanced entity bracket"))
            }
            _ => {}
        }
    }

    if state != OutsideEntity {
        return Err(BSPError::corrupt(
            lump,
            data.len(),
            0,
            0,
            "entity lump ends inside an entity",
        ));
    }

    log::debug!("Parsed {} entities", entities.len());
    Ok(entities)
}

#[cfg(test)]
mod entities_tests {
    use super::*;

    const LUMP: &[u8] = b"{\n\"classname\" \"worldspawn\"\n\"wad\" \"\\\\half-life\\\\valve\\\\halflife.wad;decals.wad\"\n}\n\
{\n\"origin\" \"1 -2 3.5\"\n\"classname\" \"light\"\n\"_light\" \"255 255 {128} 200\"\n}\n\
{\n\"model\" \"*3\"\n\"classname\" \"func_door\"\n}\n\0";

    #[test]
    fn parses_blocks_in_order() {
        let entities = parse_entities(LUMP, "Entities").unwrap();
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].classname(), Some("worldspawn"));
        assert_eq!(entities[1].properties[0].0, "origin");
        assert_eq!(entities[1].get("_light"), Some("255 255 {128} 200"));
        assert_eq!(entities[2].brush_model(), Some(3));
        assert_eq!(entities[0].brush_model(), None);
    }

    #[test]
    fn accessors() {
        let entities = parse_entities(LUMP, "Entities").unwrap();
        assert_eq!(entities[1].origin(), Some(Vec3::new(1.0, -2.0, 3.5)));
        assert_eq!(entities[0].origin(), None);
        assert_eq!(entities[0].wads(), vec!["halflife.wad", "decals.wad"]);
    }

    #[test]
    fn unterminated_is_corrupt() {
        assert!(parse_entities(b"{ \"a\" \"b\"", "Entities").is_err());
        assert!(parse_entities(b"} {", "Entities").is_err());
        assert!(parse_entities(b"", "Entities").unwrap().is_empty());
    }
}
