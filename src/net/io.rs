//! I/O 支持：以 JSON、RON 或 TOML 描述的网文档导入为 [`Net`]。
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::core::Net;
use crate::net::ids::PlaceId;
use crate::net::structure::{Place, Transition, TransitionKind, Weight};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transition '{transition}' references unknown place '{place}'")]
    UnknownPlace { transition: String, place: String },
    #[error("place '{0}' is declared twice")]
    DuplicatePlace(String),
    #[error("unsupported net format '{0}', expected json, ron or toml")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetDocument {
    pub places: Vec<PlaceDocument>,
    #[serde(default)]
    pub transitions: Vec<TransitionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceDocument {
    pub name: String,
    #[serde(default)]
    pub tokens: Weight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Weight>,
}

/// Arcs are keyed by place name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionDocument {
    pub name: String,
    pub kind: TransitionKind,
    pub rate: f64,
    #[serde(default)]
    pub inputs: BTreeMap<String, Weight>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Weight>,
    #[serde(default)]
    pub inhibitors: BTreeMap<String, Weight>,
}

impl NetDocument {
    pub fn into_net(self) -> Result<Net, IoError> {
        let mut net = Net::empty();
        let mut by_name: HashMap<String, PlaceId> = HashMap::with_capacity(self.places.len());

        for place in self.places {
            if by_name.contains_key(&place.name) {
                return Err(IoError::DuplicatePlace(place.name));
            }
            let capacity = place.capacity.unwrap_or(Weight::MAX);
            let id = net.add_place(Place::new_with_tokens_and_capacity(
                place.name.clone(),
                place.tokens,
                capacity,
            ));
            by_name.insert(place.name, id);
        }

        for doc in self.transitions {
            let transition = net.add_transition(Transition {
                name: doc.name.clone(),
                kind: doc.kind,
                rate: doc.rate,
            });
            let lookup = |place: &String| {
                by_name
                    .get(place)
                    .copied()
                    .ok_or_else(|| IoError::UnknownPlace {
                        transition: doc.name.clone(),
                        place: place.clone(),
                    })
            };
            for (place, weight) in &doc.inputs {
                net.add_input_arc(lookup(place)?, transition, *weight);
            }
            for (place, weight) in &doc.outputs {
                net.add_output_arc(lookup(place)?, transition, *weight);
            }
            for (place, weight) in &doc.inhibitors {
                net.set_inhibitor_weight(lookup(place)?, transition, *weight);
            }
        }

        Ok(net)
    }

    pub fn from_net(net: &Net) -> Self {
        let places = net
            .places
            .iter()
            .map(|place| PlaceDocument {
                name: place.name.clone(),
                tokens: place.tokens,
                capacity: (place.capacity != Weight::MAX).then_some(place.capacity),
            })
            .collect();

        let arcs = |matrix: &crate::net::Incidence<Weight>, transition| {
            matrix
                .column(transition)
                .filter(|(_, weight)| **weight > 0)
                .map(|(place, weight)| (net.places[place].name.clone(), *weight))
                .collect::<BTreeMap<_, _>>()
        };

        let transitions = net
            .transitions
            .iter_enumerated()
            .map(|(id, transition)| TransitionDocument {
                name: transition.name.clone(),
                kind: transition.kind,
                rate: transition.rate,
                inputs: arcs(&net.pre, id),
                outputs: arcs(&net.post, id),
                inhibitors: arcs(&net.inhibitor, id),
            })
            .collect();

        Self {
            places,
            transitions,
        }
    }
}

pub fn from_json_str(s: &str) -> Result<Net, IoError> {
    serde_json::from_str::<NetDocument>(s)?.into_net()
}

pub fn from_ron_str(s: &str) -> Result<Net, IoError> {
    ron::from_str::<NetDocument>(s)?.into_net()
}

pub fn from_toml_str(s: &str) -> Result<Net, IoError> {
    toml::from_str::<NetDocument>(s)?.into_net()
}

pub fn to_json_string(net: &Net) -> Result<String, IoError> {
    Ok(serde_json::to_string_pretty(&NetDocument::from_net(net))?)
}

/// Reads a net document, choosing the format by file extension.
pub fn read_net<P: AsRef<Path>>(path: P) -> Result<Net, IoError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let content = fs::read_to_string(path)?;
    match extension.as_str() {
        "json" => from_json_str(&content),
        "ron" => from_ron_str(&content),
        "toml" => from_toml_str(&content),
        other => Err(IoError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::index_vec::Idx;

    const PRODUCER: &str = r#"{
        "places": [
            { "name": "idle", "tokens": 1 },
            { "name": "busy", "capacity": 1 }
        ],
        "transitions": [
            { "name": "start", "kind": "timed", "rate": 2.0,
              "inputs": { "idle": 1 }, "outputs": { "busy": 1 } },
            { "name": "done", "kind": "immediate", "rate": 1.0,
              "inputs": { "busy": 1 }, "outputs": { "idle": 1 } }
        ]
    }"#;

    #[test]
    fn json_document_builds_net() {
        let net = from_json_str(PRODUCER).unwrap();
        assert_eq!(net.places_len(), 2);
        assert_eq!(net.transitions_len(), 2);
        assert_eq!(net.places[PlaceId::from_usize(1)].capacity, 1);
        assert_eq!(net.initial_marking().as_slice(), &[1, 0]);
        assert!(net.transitions[crate::net::TransitionId::new(1)].is_immediate());
    }

    #[test]
    fn formats_describe_the_same_net() {
        let net = from_json_str(PRODUCER).unwrap();
        let document = NetDocument::from_net(&net);

        let toml_text = toml::to_string(&document).unwrap();
        let from_toml = from_toml_str(&toml_text).unwrap();
        assert_eq!(NetDocument::from_net(&from_toml), document);

        let ron_text = ron::to_string(&document).unwrap();
        let from_ron = from_ron_str(&ron_text).unwrap();
        assert_eq!(NetDocument::from_net(&from_ron), document);
    }

    #[test]
    fn unknown_place_is_rejected() {
        let text = r#"{
            "places": [{ "name": "p" }],
            "transitions": [{ "name": "t", "kind": "timed", "rate": 1.0, "inputs": { "q": 1 } }]
        }"#;
        assert!(matches!(
            from_json_str(text),
            Err(IoError::UnknownPlace { .. })
        ));
    }

    #[test]
    fn duplicate_place_is_rejected() {
        let text = r#"{ "places": [{ "name": "p" }, { "name": "p" }] }"#;
        assert!(matches!(from_json_str(text), Err(IoError::DuplicatePlace(_))));
    }
}
