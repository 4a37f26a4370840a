//! SLURM node list expansion
//!
//! The scheduler reports the allocated hosts in a compact form, e.g.
//! - `jsfc056` -> 1 node
//! - `jsfc[056-058]` -> 3 nodes (`jsfc056`, `jsfc057`, `jsfc058`)
//!
//! Each host becomes one [NODE_VARIABLE_PREFIX] variable, numbered by a running correlative index
//! (`CO_SIM_SLURM_NODE_000`, `CO_SIM_SLURM_NODE_001`, ...) that is independent of the host suffix.

pub const NODE_VARIABLE_PREFIX: &str = "CO_SIM_SLURM_NODE";

/// Contiguous numeric host range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAllocation {
    pub prefix: String,
    pub first_index: u32,
    pub last_index: u32,
    /// zero padded width of the numeric suffix, at least 3
    pub width: usize,
}

impl NodeAllocation {
    pub fn node_count(&self) -> usize {
        (self.last_index - self.first_index) as usize + 1
    }

    pub fn hostnames(&self) -> impl Iterator<Item = String> + '_ {
        (self.first_index..=self.last_index)
            .map(move |index| format!("{}{:0width$}", self.prefix, index, width = self.width))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeList {
    Single(String),
    Range(NodeAllocation),
}

/// One allocated host and the variable that refers to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub variable: String,
    pub hostname: String,
}

pub fn node_variable_name(correlative: usize) -> String {
    format!("{NODE_VARIABLE_PREFIX}_{correlative:03}")
}

/// Parse a scheduler node list expression
pub fn parse_node_list(expression: &str) -> Result<NodeList, ClusterError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(ClusterError::NodeListNotSet);
    }

    let malformed = || ClusterError::MalformedNodeList(expression.to_string());

    let tokens: Vec<&str> = expression
        .split(['[', ']'])
        .filter(|token| !token.is_empty())
        .collect();

    match tokens.as_slice() {
        [hostname] if !expression.contains(['[', ']']) => {
            Ok(NodeList::Single(hostname.to_string()))
        }
        [prefix, range] if expression.ends_with(']') => {
            let (first, last) = range.split_once('-').ok_or_else(malformed)?;
            let first_index: u32 = first.parse().map_err(|_| malformed())?;
            let last_index: u32 = last.parse().map_err(|_| malformed())?;
            if last_index < first_index {
                return Err(malformed());
            }

            Ok(NodeList::Range(NodeAllocation {
                prefix: prefix.to_string(),
                first_index,
                last_index,
                width: first.len().max(3),
            }))
        }
        _ => Err(malformed()),
    }
}

/// Expand a node list into one [ClusterNode] per host
///
/// `reported_count` is the node count reported by the scheduler (`SLURM_NNODES`) and must agree
/// with the expanded list.
pub fn expand(expression: &str, reported_count: usize) -> Result<Vec<ClusterNode>, ClusterError> {
    let node_list = parse_node_list(expression)?;
    let expanded = match &node_list {
        NodeList::Single(_) => 1,
        NodeList::Range(allocation) => allocation.node_count(),
    };

    // checked before any hostname is built
    if expanded != reported_count {
        tracing::error!(
            expression,
            reported_count,
            expanded,
            "node count does not match the node list"
        );
        return Err(ClusterError::NodeCountMismatch {
            reported: reported_count,
            expanded,
        });
    }

    let hostnames: Vec<String> = match node_list {
        NodeList::Single(hostname) => vec![hostname],
        NodeList::Range(allocation) => allocation.hostnames().collect(),
    };

    Ok(hostnames
        .into_iter()
        .enumerate()
        .map(|(correlative, hostname)| ClusterNode {
            variable: node_variable_name(correlative),
            hostname,
        })
        .collect())
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ClusterError {
    #[error("SLURM_NODELIST is not set, resources must be allocated first (salloc)")]
    NodeListNotSet,
    #[error("SLURM_NNODES is not set, resources must be allocated first (salloc)")]
    NodeCountNotSet,
    #[error("SLURM_NNODES is not a number: {0:?}")]
    InvalidNodeCount(String),
    #[error("node list {0:?} is not of the form `host` or `prefix[first-last]`")]
    MalformedNodeList(String),
    #[error("SLURM_NNODES reports {reported} nodes but the node list expands to {expanded}")]
    NodeCountMismatch { reported: usize, expanded: usize },
}
