//! Kill definition tree: named kills in the header, then `(kill, node)` records
//! whose items reference components, sibling nodes, or nodes of other kills.

use super::{split_fields, LineReader};
use crate::config::{DEFAULT_MAX_KILL_DEPTH, MAX_KILL_COMPONENTS};
use crate::error::LoadError;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub kill: u32,
    pub node: u32,
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "k{},{}", self.kill, self.node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillItem {
    /// `c<id>`
    Component(u32),
    /// `n<node>`: another node of the same kill.
    Node(u32),
    /// `k<kill>,<node>`
    Kill(NodeKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KillNode {
    pub op: String,
    pub items: Vec<KillItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillHeader {
    pub kill: u32,
    pub description: String,
}

/// Component list of one resolved node and the depth its walk reached.
struct Flattened {
    ids: Vec<u32>,
    reach: usize,
}

#[derive(Debug, Clone)]
pub struct KillTree {
    pub kills: Vec<KillHeader>,
    /// Kill whose description matched the requested one.
    pub selected_kill: Option<u32>,
    nodes: BTreeMap<NodeKey, KillNode>,
    last_node: BTreeMap<u32, u32>,
    max_depth: usize,
}

/// `k12` (any case) -> 12.
pub fn parse_kill_label(label: &str) -> Option<u32> {
    let rest = label.strip_prefix('k').or_else(|| label.strip_prefix('K'))?;
    rest.parse().ok()
}

fn parse_item(token: &str) -> Option<KillItem> {
    let token = token.to_ascii_lowercase();
    let mut chars = token.chars();
    let prefix = chars.next()?;
    let rest = chars.as_str();
    match prefix {
        'c' => rest.parse().ok().map(KillItem::Component),
        'n' => rest.parse().ok().map(KillItem::Node),
        'k' => {
            let (kill, node) = rest.split_once(',')?;
            Some(KillItem::Kill(NodeKey {
                kill: kill.parse().ok()?,
                node: node.parse().ok()?,
            }))
        }
        _ => None,
    }
}

impl KillTree {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn node(&self, key: NodeKey) -> Option<&KillNode> {
        self.nodes.get(&key)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Most recently defined node of a kill; the default entry point for resolution.
    pub fn last_node(&self, kill: u32) -> Option<u32> {
        self.last_node.get(&kill).copied()
    }

    /// Flatten a kill node into component ids, in item order. Duplicates are kept.
    /// `node` defaults to the last node defined for `kill`.
    pub fn extract_components(&self, kill: u32, node: Option<u32>) -> Result<Vec<u32>, LoadError> {
        let node = match node {
            Some(n) => n,
            None => self.last_node(kill).ok_or(LoadError::UnknownKill(kill))?,
        };
        let root = NodeKey { kill, node };
        let mut memo = BTreeMap::new();
        self.flatten(root, &mut Vec::new(), &mut memo)?;
        Ok(memo.remove(&root).map(|f| f.ids).unwrap_or_default())
    }

    /// Flatten `key` into `memo` once; shared sub-nodes reuse the stored list.
    /// Returns how many levels the walk below `key` reaches, counting `key`.
    fn flatten(
        &self,
        key: NodeKey,
        path: &mut Vec<NodeKey>,
        memo: &mut BTreeMap<NodeKey, Flattened>,
    ) -> Result<usize, LoadError> {
        if let Some(done) = memo.get(&key) {
            if path.len() + done.reach > self.max_depth {
                return Err(LoadError::KillDepth {
                    kill: key.kill,
                    node: key.node,
                });
            }
            return Ok(done.reach);
        }
        if path.contains(&key) {
            return Err(LoadError::KillCycle {
                kill: key.kill,
                node: key.node,
            });
        }
        if path.len() >= self.max_depth {
            return Err(LoadError::KillDepth {
                kill: key.kill,
                node: key.node,
            });
        }
        let Some(node) = self.nodes.get(&key) else {
            tracing::warn!("kill node {} is referenced but not defined", key);
            memo.insert(key, Flattened { ids: Vec::new(), reach: 1 });
            return Ok(1);
        };
        path.push(key);
        let mut ids = Vec::new();
        let mut reach = 1;
        for item in &node.items {
            let child = match *item {
                KillItem::Component(id) => {
                    ids.push(id);
                    continue;
                }
                KillItem::Node(n) => NodeKey {
                    kill: key.kill,
                    node: n,
                },
                KillItem::Kill(other) => other,
            };
            reach = reach.max(1 + self.flatten(child, path, memo)?);
            if let Some(done) = memo.get(&child) {
                if ids.len() + done.ids.len() > MAX_KILL_COMPONENTS {
                    return Err(LoadError::KillTooLarge {
                        kill: key.kill,
                        node: key.node,
                        limit: MAX_KILL_COMPONENTS,
                    });
                }
                ids.extend_from_slice(&done.ids);
            }
        }
        path.pop();
        memo.insert(key, Flattened { ids, reach });
        Ok(reach)
    }
}

/// Read a kill file, selecting the kill whose description equals `requested`.
pub fn read_kill_file(
    path: &Path,
    requested: Option<&str>,
    max_bytes: u64,
) -> Result<KillTree, LoadError> {
    let mut reader = LineReader::open(path, max_bytes)?;
    let tree = parse_kill_file(&mut reader, requested)?;
    tracing::info!(
        "read {} kill(s), {} node(s) from {}",
        tree.kills.len(),
        tree.nodes.len(),
        path.display()
    );
    Ok(tree)
}

pub(crate) fn parse_kill_file<R: BufRead>(
    reader: &mut LineReader<R>,
    requested: Option<&str>,
) -> Result<KillTree, LoadError> {
    let requested = requested.map(str::trim).filter(|d| !d.is_empty());
    let mut tree = KillTree {
        kills: Vec::new(),
        selected_kill: None,
        nodes: BTreeMap::new(),
        last_node: BTreeMap::new(),
        max_depth: DEFAULT_MAX_KILL_DEPTH,
    };
    if reader.next_line()?.is_none() {
        if requested.is_some() {
            return Err(reader.error("kill definition file is empty"));
        }
        return Ok(tree);
    }

    let line = reader.expect_line("kill count")?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 2 {
        return Err(reader.error("cannot read number of kills in kill file"));
    }
    let num_kills: usize = reader.parse(Some(tokens[0]), "kill count")?;
    for i in 0..num_kills {
        let line = reader.expect_line(&format!("kill header line {}", i + 1))?;
        let f = split_fields(&line, 4);
        let kill = f
            .first()
            .and_then(|t| parse_kill_label(t))
            .ok_or_else(|| reader.error(format!("bad kill id in header line {}", i + 1)))?;
        let description = f.get(3).copied().unwrap_or("").trim().to_string();
        if requested == Some(description.as_str()) {
            tree.selected_kill = Some(kill);
        }
        tree.kills.push(KillHeader { kill, description });
    }
    if requested.is_some() && tree.selected_kill.is_none() {
        return Err(reader.error(
            "did not find kill ID match between kill definition file and output file",
        ));
    }

    let mut current: Option<NodeKey> = None;
    while let Some(line) = reader.next_line()? {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            continue;
        };
        if first.starts_with('#') {
            continue;
        }
        if let Some(rest) = first.strip_prefix('&') {
            let key = current.ok_or_else(|| reader.error("continuation line before any kill node"))?;
            let extra = std::iter::once(rest)
                .filter(|r| !r.is_empty())
                .chain(tokens[1..].iter().copied());
            let items = parse_items(reader, extra)?;
            if let Some(node) = tree.nodes.get_mut(&key) {
                node.items.extend(items);
            }
            continue;
        }
        let (key, rest) = if let Some(kill) = parse_kill_label(first) {
            let node: u32 = reader.parse(tokens.get(1).copied(), "kill node number")?;
            (NodeKey { kill, node }, &tokens[2.min(tokens.len())..])
        } else if first.chars().all(|c| c.is_ascii_digit()) {
            let kill = current
                .map(|k| k.kill)
                .ok_or_else(|| reader.error("node line before any kill type"))?;
            let node: u32 = reader.parse(Some(first), "kill node number")?;
            (NodeKey { kill, node }, &tokens[1..])
        } else {
            return Err(reader.error(format!("unrecognized token in kill file: {:?}", first)));
        };
        let (op, items) = rest
            .split_first()
            .ok_or_else(|| reader.error(format!("kill node {} has no operator", key)))?;
        let items = parse_items(reader, items.iter().copied())?;
        tree.nodes.insert(
            key,
            KillNode {
                op: op.to_string(),
                items,
            },
        );
        tree.last_node.insert(key.kill, key.node);
        current = Some(key);
    }
    Ok(tree)
}

fn parse_items<'a, R: BufRead>(
    reader: &LineReader<R>,
    tokens: impl Iterator<Item = &'a str>,
) -> Result<Vec<KillItem>, LoadError> {
    tokens
        .map(|t| {
            parse_item(t).ok_or_else(|| reader.error(format!("unrecognized kill item {:?}", t)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KILLS: &str = "\
KILL DEFINITIONS
3 0
K1 0 0 Mobility kill
K2 0 0 Firepower kill
K3 0 0 Catastrophic kill
# mobility
k1 1 OR c1 c2
2 AND n1 k3,1
& c9
k3 1 OR c4 c5
k3 2 OR c7 c8
";

    fn parse(text: &str, requested: Option<&str>) -> Result<KillTree, LoadError> {
        let mut r = LineReader::from_text("t.kill", text);
        parse_kill_file(&mut r, requested)
    }

    #[test]
    fn selects_kill_by_description() {
        let t = parse(KILLS, Some("Firepower kill")).unwrap();
        assert_eq!(t.selected_kill, Some(2));
        assert_eq!(t.kills.len(), 3);
        assert!(parse(KILLS, Some("Nope")).is_err());
        assert_eq!(parse(KILLS, Some("  ")).unwrap().selected_kill, None);
    }

    #[test]
    fn flattens_sibling_and_cross_kill_references() {
        let t = parse(KILLS, None).unwrap();
        assert_eq!(t.last_node(1), Some(2));
        assert_eq!(t.last_node(3), Some(2));
        let comps = t.extract_components(1, None).unwrap();
        assert_eq!(comps, vec![1, 2, 4, 5, 9]);
        assert_eq!(t.extract_components(1, None).unwrap(), comps);
        assert_eq!(t.extract_components(3, Some(1)).unwrap(), vec![4, 5]);
        assert_eq!(t.node(NodeKey { kill: 1, node: 2 }).unwrap().op, "AND");
    }

    #[test]
    fn shared_subnodes_repeat_ids() {
        let text = format!("{}k4 1 OR k3,1 k3,1\n", KILLS);
        let t = parse(&text, None).unwrap();
        assert_eq!(t.extract_components(4, None).unwrap(), vec![4, 5, 4, 5]);
    }

    fn diamond_chain(levels: u32) -> String {
        let mut text = String::from("T\n1 0\nK1 0 0 Chain\nk1 0 OR c1\n");
        for i in 1..=levels {
            text.push_str(&format!("{} OR n{} n{}\n", i, i - 1, i - 1));
        }
        text
    }

    #[test]
    fn diamond_chains_resolve_each_node_once() {
        let t = parse(&diamond_chain(15), None).unwrap();
        let comps = t.extract_components(1, None).unwrap();
        assert_eq!(comps.len(), 1 << 15);
        assert!(comps.iter().all(|&c| c == 1));
    }

    #[test]
    fn oversized_expansion_fails_fast() {
        let t = parse(&diamond_chain(60), None).unwrap();
        let err = t.extract_components(1, None).unwrap_err();
        assert!(matches!(err, LoadError::KillTooLarge { kill: 1, node: 21, .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatViolation);
    }

    #[test]
    fn shared_node_counts_its_depth_on_reuse() {
        // n1 resolves shallow first, then is reused one level deeper under n2.
        let text = "T\n1 0\nK1 0 0 A\nk1 1 OR c1\n2 OR n1\n3 OR n1 n2\n";
        let t = parse(text, None).unwrap();
        let deep_enough = t.clone().with_max_depth(3);
        assert_eq!(deep_enough.extract_components(1, None).unwrap(), vec![1, 1]);
        assert!(matches!(
            t.with_max_depth(2).extract_components(1, None),
            Err(LoadError::KillDepth { .. })
        ));
    }

    #[test]
    fn cycles_are_detected() {
        let text = format!("{}k5 1 OR n2\n2 OR c1 n1\n", KILLS);
        let t = parse(&text, None).unwrap();
        assert!(matches!(
            t.extract_components(5, Some(1)),
            Err(LoadError::KillCycle { kill: 5, node: 1 })
        ));
    }

    #[test]
    fn depth_cap_applies() {
        let t = parse(KILLS, None).unwrap().with_max_depth(1);
        assert!(matches!(
            t.extract_components(1, Some(2)),
            Err(LoadError::KillDepth { .. })
        ));
    }

    #[test]
    fn malformed_items_and_lines_fail() {
        assert!(parse(&format!("{}k6 1 OR x7\n", KILLS), None)
            .unwrap_err()
            .to_string()
            .contains("unrecognized kill item"));
        assert!(parse(&format!("{}k6 1 OR k3\n", KILLS), None).is_err());
        assert!(parse(&format!("{}zz 1 OR c1\n", KILLS), None).is_err());
        let text = "T\n1 0\nK1 0 0 A\n& c1\n";
        assert!(parse(text, None).is_err());
    }

    #[test]
    fn unknown_kill_and_dangling_node() {
        let t = parse(KILLS, None).unwrap();
        assert!(matches!(
            t.extract_components(9, None),
            Err(LoadError::UnknownKill(9))
        ));
        assert!(t.extract_components(1, Some(42)).unwrap().is_empty());
    }
}
