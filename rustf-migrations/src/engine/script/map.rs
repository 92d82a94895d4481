//! Revision graph built from the scripts of a migration environment

use super::revision::RevisionScript;
use crate::error::{Error, Result};
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, VecDeque};

static RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_@]*?)([-+])(\d+)$").expect("valid regex"));

/// All revisions of an environment, stored bases first
#[derive(Debug, Default)]
pub(crate) struct RevisionMap {
    revisions: IndexMap<String, RevisionScript>,
    children: HashMap<String, Vec<String>>,
    labels: HashMap<String, String>,
}

impl RevisionMap {
    pub fn new(scripts: Vec<RevisionScript>) -> Result<Self> {
        let mut by_id: IndexMap<String, RevisionScript> = IndexMap::new();
        for script in scripts {
            let id = script.revision().to_string();
            if by_id.contains_key(&id) {
                return Err(Error::command(format!(
                    "Revision {} is present more than once",
                    id
                )));
            }
            by_id.insert(id, script);
        }

        let mut labels = HashMap::new();
        for (id, script) in &by_id {
            for parent in script
                .script
                .down_revisions
                .iter()
                .chain(script.script.depends_on.iter())
            {
                if !by_id.contains_key(parent) {
                    return Err(Error::command(format!(
                        "Revision {} referenced from {} is not present",
                        parent, id
                    )));
                }
            }
            for label in &script.script.branch_labels {
                if let Some(other) = labels.insert(label.clone(), id.clone()) {
                    return Err(Error::command(format!(
                        "Branch name '{}' in revision {} already used by revision {}",
                        label, id, other
                    )));
                }
            }
        }

        let order = topological_order(&by_id)?;
        let mut revisions = IndexMap::with_capacity(by_id.len());
        for id in order {
            if let Some(script) = by_id.shift_remove(&id) {
                revisions.insert(id, script);
            }
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for (id, script) in &revisions {
            for parent in &script.script.down_revisions {
                children.entry(parent.clone()).or_default().push(id.clone());
            }
        }

        Ok(Self {
            revisions,
            children,
            labels,
        })
    }

    pub fn get(&self, id: &str) -> Option<&RevisionScript> {
        self.revisions.get(id)
    }

    /// Scripts, bases first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RevisionScript> {
        self.revisions.values()
    }

    pub fn children_of(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn parents_of(&self, id: &str) -> &[String] {
        self.revisions
            .get(id)
            .map(|s| s.script.down_revisions.as_slice())
            .unwrap_or(&[])
    }

    pub fn heads(&self) -> Vec<String> {
        self.revisions
            .keys()
            .filter(|id| self.children_of(id).is_empty())
            .cloned()
            .collect()
    }

    /// Heads when `depends_on` links also count as descendants
    pub fn heads_with_dependencies(&self) -> Vec<String> {
        let depended: IndexSet<&str> = self
            .revisions
            .values()
            .flat_map(|s| s.script.depends_on.iter().map(String::as_str))
            .collect();

        self.heads()
            .into_iter()
            .filter(|id| !depended.contains(id.as_str()))
            .collect()
    }

    pub fn bases(&self) -> Vec<String> {
        self.revisions
            .values()
            .filter(|s| s.script.is_base())
            .map(|s| s.revision().to_string())
            .collect()
    }

    pub fn branch_points(&self) -> Vec<String> {
        self.revisions
            .keys()
            .filter(|id| self.children_of(id).len() > 1)
            .cloned()
            .collect()
    }

    /// Find one revision by full id, branch label or unique id prefix
    pub fn lookup(&self, id: &str) -> Result<String> {
        if self.revisions.contains_key(id) {
            return Ok(id.to_string());
        }
        if let Some(labelled) = self.labels.get(id) {
            return Ok(labelled.clone());
        }

        let candidates: Vec<&String> = self
            .revisions
            .keys()
            .filter(|rev| rev.starts_with(id))
            .collect();

        match candidates.as_slice() {
            [single] => Ok((*single).clone()),
            [] => Err(Error::command(format!(
                "Can't locate revision identified by '{}'",
                id
            ))),
            many => Err(Error::command(format!(
                "Multiple revisions start with '{}': {}",
                id,
                many.iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Resolve a revision symbol to the set of revisions it names
    ///
    /// `current` holds the revisions the database is at; it anchors
    /// `current` and relative symbols without a base such as `-1`.
    pub fn resolve(&self, symbol: &str, current: &[String]) -> Result<Vec<String>> {
        let symbol = symbol.trim();
        match symbol {
            "base" | "" => return Ok(Vec::new()),
            "heads" => return Ok(self.heads()),
            "head" => return self.single_head(self.heads(), symbol),
            "current" => return Ok(current.to_vec()),
            _ => {}
        }

        if let Some(label) = symbol.strip_suffix("@head") {
            let root = self.lookup(label)?;
            let heads: Vec<String> = self
                .heads()
                .into_iter()
                .filter(|head| self.ancestors(std::slice::from_ref(head)).contains(&root))
                .collect();
            return self.single_head(heads, symbol);
        }

        if let Some(captures) = RELATIVE.captures(symbol) {
            let steps: usize = captures[3]
                .parse()
                .map_err(|_| Error::command(format!("Invalid relative revision '{}'", symbol)))?;
            let anchor = match &captures[1] {
                "" => current.to_vec(),
                base => self.resolve(base, current)?,
            };
            return self.walk(symbol, anchor, &captures[2] == "+", steps);
        }

        Ok(vec![self.lookup(symbol)?])
    }

    fn single_head(&self, heads: Vec<String>, symbol: &str) -> Result<Vec<String>> {
        if heads.len() > 1 {
            return Err(Error::command(format!(
                "Multiple head revisions are present for given argument '{}'; please specify \
                 a specific target revision, '<branchname>@head' to narrow to a specific head, \
                 or 'heads' for all heads",
                symbol
            )));
        }
        Ok(heads)
    }

    fn walk(&self, symbol: &str, anchor: Vec<String>, upward: bool, steps: usize) -> Result<Vec<String>> {
        if anchor.len() > 1 {
            return Err(Error::command(format!(
                "Relative revision '{}' is ambiguous with multiple current revisions: {}",
                symbol,
                anchor.join(", ")
            )));
        }

        let mut node = anchor.into_iter().next();
        for _ in 0..steps {
            let next: Vec<String> = if upward {
                match &node {
                    Some(id) => self.children_of(id).to_vec(),
                    None => self.bases(),
                }
            } else {
                match &node {
                    Some(id) => self.parents_of(id).to_vec(),
                    None => {
                        return Err(Error::command(format!(
                            "Relative revision {} didn't produce {} migrations",
                            symbol, steps
                        )))
                    }
                }
            };

            node = match next.len() {
                0 if upward => {
                    return Err(Error::command(format!(
                        "Relative revision {} didn't produce {} migrations",
                        symbol, steps
                    )))
                }
                0 => None,
                1 => next.into_iter().next(),
                _ => {
                    return Err(Error::command(format!(
                        "Relative revision {} crosses a branch or merge point; \
                         specify an explicit revision",
                        symbol
                    )))
                }
            };
        }

        Ok(node.into_iter().collect())
    }

    /// `ids` and everything they depend on
    pub fn ancestors(&self, ids: &[String]) -> IndexSet<String> {
        let mut seen = IndexSet::new();
        let mut queue: VecDeque<String> = ids.iter().cloned().collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(script) = self.revisions.get(&id) {
                for parent in script
                    .script
                    .down_revisions
                    .iter()
                    .chain(script.script.depends_on.iter())
                {
                    queue.push_back(parent.clone());
                }
            }
        }

        seen
    }

    /// Revisions to apply to go from `current` to `target`, in order
    pub fn upgrade_steps(&self, current: &[String], target: &[String]) -> Vec<String> {
        let have = self.ancestors(current);
        let want = self.ancestors(target);
        self.revisions
            .keys()
            .filter(|id| want.contains(*id) && !have.contains(*id))
            .cloned()
            .collect()
    }

    /// Revisions to revert to go from `current` down to `target`, in order
    pub fn downgrade_steps(&self, current: &[String], target: &[String]) -> Vec<String> {
        let have = self.ancestors(current);
        let keep = self.ancestors(target);
        self.revisions
            .keys()
            .rev()
            .filter(|id| have.contains(*id) && !keep.contains(*id))
            .cloned()
            .collect()
    }

    /// Revisions between `lower` (inclusive) and `upper`, newest first
    pub fn range(&self, lower: &[String], upper: &[String]) -> Vec<String> {
        let below = self.ancestors(lower);
        let within = self.ancestors(upper);
        self.revisions
            .keys()
            .rev()
            .filter(|id| within.contains(*id) && (!below.contains(*id) || lower.contains(*id)))
            .cloned()
            .collect()
    }

    /// Version table rows after applying `revision` on top of `state`
    pub fn after_upgrade(&self, state: &[String], revision: &str) -> Vec<String> {
        let mut below = self.ancestors(&[revision.to_string()]);
        below.shift_remove(revision);

        let mut next: Vec<String> = state
            .iter()
            .filter(|head| !below.contains(*head) && head.as_str() != revision)
            .cloned()
            .collect();
        next.push(revision.to_string());
        next
    }

    /// Version table rows after reverting `revision` from `state`
    pub fn after_downgrade(&self, state: &[String], revision: &str) -> Vec<String> {
        let mut next: Vec<String> = state
            .iter()
            .filter(|head| head.as_str() != revision)
            .cloned()
            .collect();

        for parent in self.parents_of(revision) {
            let still_covered = next
                .iter()
                .any(|head| self.ancestors(std::slice::from_ref(head)).contains(parent));
            if !still_covered {
                next.push(parent.clone());
            }
        }
        next
    }

    /// `rev (label) (head)` form used by `heads`, `current` and `branches`
    pub fn describe_short(&self, id: &str, current: &[String]) -> String {
        format!("{}{}", id, self.annotations(id, current))
    }

    fn annotations(&self, id: &str, current: &[String]) -> String {
        let Some(script) = self.revisions.get(id) else {
            return String::new();
        };
        let script = &script.script;

        let mut flags = Vec::new();
        if self.children_of(id).is_empty() {
            flags.push("head");
        }
        if self.children_of(id).len() > 1 {
            flags.push("branchpoint");
        }
        if script.is_merge_point() {
            flags.push("mergepoint");
        }
        if current.iter().any(|c| c == id) {
            flags.push("current");
        }

        let mut out = String::new();
        if !script.branch_labels.is_empty() {
            out.push_str(&format!(" ({})", script.branch_labels.join(", ")));
        }
        for flag in flags {
            out.push_str(&format!(" ({})", flag));
        }
        out
    }

    /// One-line or verbose description of a revision for listings
    pub fn describe(&self, id: &str, verbose: bool, current: &[String]) -> String {
        let Some(script) = self.revisions.get(id) else {
            return id.to_string();
        };
        let annotations = self.annotations(id, current);
        let script = &script.script;

        let parents = if script.down_revisions.is_empty() {
            "<base>".to_string()
        } else {
            script.down_revisions.join(", ")
        };

        if !verbose {
            return format!(
                "{} -> {}{}, {}",
                parents,
                script.revision,
                annotations,
                script.doc()
            );
        }

        let mut lines = vec![format!("Rev: {}{}", script.revision, annotations)];
        if script.is_merge_point() {
            lines.push(format!("Merges: {}", parents));
        } else {
            lines.push(format!("Parent: {}", parents));
        }
        if !script.depends_on.is_empty() {
            lines.push(format!("Also depends on: {}", script.depends_on.join(", ")));
        }
        let children = self.children_of(id);
        if children.len() > 1 {
            lines.push(format!("Branches into: {}", children.join(", ")));
        }
        lines.push(format!("Path: {}", script.path.display()));
        lines.push(String::new());
        lines.push(format!("    {}", script.doc()));
        lines.push(String::new());
        lines.push(format!("    Revision ID: {}", script.revision));
        lines.push(format!("    Revises: {}", script.down_revisions.join(", ")));
        if let Some(date) = &script.create_date {
            lines.push(format!("    Create Date: {}", date));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Kahn's algorithm; ties keep the order scripts were loaded in
fn topological_order(by_id: &IndexMap<String, RevisionScript>) -> Result<Vec<String>> {
    let mut pending: IndexMap<&str, usize> = by_id
        .iter()
        .map(|(id, script)| {
            let edges = script.script.down_revisions.len() + script.script.depends_on.len();
            (id.as_str(), edges)
        })
        .collect();

    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (id, script) in by_id {
        for parent in script
            .script
            .down_revisions
            .iter()
            .chain(script.script.depends_on.iter())
        {
            dependents.entry(parent.as_str()).or_default().push(id.as_str());
        }
    }

    let mut order = Vec::with_capacity(by_id.len());
    let mut ready: VecDeque<&str> = pending
        .iter()
        .filter(|(_, edges)| **edges == 0)
        .map(|(id, _)| *id)
        .collect();

    while let Some(id) = ready.pop_front() {
        order.push(id.to_string());
        for dependent in dependents.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(edges) = pending.get_mut(dependent) {
                *edges -= 1;
                if *edges == 0 {
                    ready.push_back(*dependent);
                }
            }
        }
    }

    if order.len() != by_id.len() {
        return Err(Error::command(
            "Revision graph contains a cycle; check the 'Revises' headers",
        ));
    }

    Ok(order)
}
