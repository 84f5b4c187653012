//! Whole-graph consistency checks
//!
//! Refactorings keep graphs consistent one edit at a time; these checks run
//! over the finished result and report every violation found, not just the
//! first.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::{Connection, ScadGraph};
use crate::port::{PortId, PortType};
use crate::project::ScadProject;
use crate::rules::{ConnectionRules, RuleFlags};

/// Violation with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two nodes share one id
    DuplicateNode { graph: String, node: String },
    /// A connection names a node that is not in the graph
    DanglingConnection {
        graph: String,
        connection: Connection,
        node: String,
    },
    /// A connection names a port the node does not have
    PortOutOfRange { graph: String, connection: Connection },
    /// A value input is fed by more than one connection
    MultipleInputs {
        graph: String,
        node: String,
        port: usize,
    },
    /// A bound node whose partner is missing or does not point back
    BrokenBoundPair { graph: String, node: String },
    /// Cycle detected in the graph
    CycleDetected { graph: String },
    /// A connection the rules no longer allow
    DisallowedConnection { graph: String, connection: Connection },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNode { graph, node } => {
                write!(f, "Node id '{}' is used twice in '{}'", node, graph)
            }
            Self::DanglingConnection {
                graph,
                connection,
                node,
            } => {
                write!(
                    f,
                    "Connection {} in '{}' references unknown node '{}'",
                    connection, graph, node
                )
            }
            Self::PortOutOfRange { graph, connection } => {
                write!(f, "Connection {} in '{}' uses a missing port", connection, graph)
            }
            Self::MultipleInputs { graph, node, port } => {
                write!(
                    f,
                    "Input {} of node '{}' in '{}' has more than one connection",
                    port, node, graph
                )
            }
            Self::BrokenBoundPair { graph, node } => {
                write!(f, "Node '{}' in '{}' has no matching partner", node, graph)
            }
            Self::CycleDetected { graph } => write!(f, "Cycle detected in '{}'", graph),
            Self::DisallowedConnection { graph, connection } => {
                write!(f, "Connection {} in '{}' is not allowed", connection, graph)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate one graph against its own structure and the rules
pub fn validate_graph(graph: &ScadGraph, rules: &ConnectionRules) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_node_ids(graph, &mut errors);
    let sound = validate_connection_ends(graph, &mut errors);
    validate_fan_in(graph, &mut errors);
    validate_bound_pairs(graph, &mut errors);
    detect_cycles(graph, &mut errors);

    // rule checks need both ends in place
    for connection in sound {
        if !rules
            .can_connect(graph, connection, RuleFlags::revalidating())
            .is_allowed()
        {
            errors.push(ValidationError::DisallowedConnection {
                graph: graph.id().to_string(),
                connection: connection.clone(),
            });
        }
    }

    errors
}

/// Validate every graph of a project
pub fn validate_project(project: &ScadProject, rules: &ConnectionRules) -> Vec<ValidationError> {
    project
        .graphs()
        .flat_map(|graph| validate_graph(graph, rules))
        .collect()
}

fn validate_node_ids(graph: &ScadGraph, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for node in graph.nodes() {
        if !seen.insert(node.id()) {
            errors.push(ValidationError::DuplicateNode {
                graph: graph.id().to_string(),
                node: node.id().to_string(),
            });
        }
    }
}

/// Check endpoints and port ranges; returns the connections that passed
fn validate_connection_ends<'g>(graph: &'g ScadGraph, errors: &mut Vec<ValidationError>) -> Vec<&'g Connection> {
    let mut sound = Vec::new();
    for connection in graph.connections() {
        let mut ok = true;
        for id in [&connection.from, &connection.to] {
            if !graph.contains_node(id) {
                errors.push(ValidationError::DanglingConnection {
                    graph: graph.id().to_string(),
                    connection: connection.clone(),
                    node: id.clone(),
                });
                ok = false;
            }
        }
        if !ok {
            continue;
        }
        let in_range = graph
            .find_node(&connection.from)
            .map(|n| connection.from_port < n.output_count())
            .unwrap_or(false)
            && graph
                .find_node(&connection.to)
                .map(|n| connection.to_port < n.input_count())
                .unwrap_or(false);
        if in_range {
            sound.push(connection);
        } else {
            errors.push(ValidationError::PortOutOfRange {
                graph: graph.id().to_string(),
                connection: connection.clone(),
            });
        }
    }
    sound
}

fn validate_fan_in(graph: &ScadGraph, errors: &mut Vec<ValidationError>) {
    let mut counts: HashMap<(&str, usize), usize> = HashMap::new();
    for connection in graph.connections() {
        *counts.entry((&connection.to, connection.to_port)).or_insert(0) += 1;
    }
    let mut crowded: Vec<(&str, usize)> = counts
        .into_iter()
        .filter(|&((node, port), count)| {
            count > 1
                && graph
                    .find_node(node)
                    .filter(|n| !n.accepts_multiple_inputs(port))
                    .and_then(|n| n.port_type(PortId::input(port)))
                    .map(|t| t != PortType::Geometry)
                    .unwrap_or(false)
        })
        .map(|(key, _)| key)
        .collect();
    crowded.sort();
    for (node, port) in crowded {
        errors.push(ValidationError::MultipleInputs {
            graph: graph.id().to_string(),
            node: node.to_string(),
            port,
        });
    }
}

fn validate_bound_pairs(graph: &ScadGraph, errors: &mut Vec<ValidationError>) {
    for node in graph.nodes() {
        let Some(bound) = node.as_bound() else {
            continue;
        };
        let matched = graph
            .find_node(bound.other_node_id())
            .and_then(|partner| partner.as_bound())
            .map(|partner| partner.other_node_id() == node.id() && partner.is_start() != bound.is_start())
            .unwrap_or(false);
        if !matched {
            errors.push(ValidationError::BrokenBoundPair {
                graph: graph.id().to_string(),
                node: node.id().to_string(),
            });
        }
    }
}

/// Detect cycles using Kahn's algorithm
fn detect_cycles(graph: &ScadGraph, errors: &mut Vec<ValidationError>) {
    let mut in_degree: HashMap<&str, usize> = graph.nodes().map(|n| (n.id(), 0)).collect();
    for connection in graph.connections() {
        if let Some(degree) = in_degree.get_mut(connection.to.as_str()) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for connection in graph.connections().iter().filter(|c| c.from == node_id) {
            if let Some(degree) = in_degree.get_mut(connection.to.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(&connection.to);
                }
            }
        }
    }

    if visited < in_degree.len() {
        errors.push(ValidationError::CycleDetected {
            graph: graph.id().to_string(),
        });
    }
}
