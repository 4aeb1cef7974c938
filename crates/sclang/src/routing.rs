//! Audio graph to buses, effect synths and modulator mappings.
//!
//! Every effect node reads from its own stereo audio bus. A node's output
//! goes wherever its first connection points: another effect's bus, or the
//! hardware output when the target is the master sink.

use std::collections::HashMap;

use composition::{
    Diagnostic, Diagnostics, NodeCategory, NodeKind, ResolvedComposition, MASTER,
};
use tracing::debug;

use crate::literal::{identifier, Names};
use crate::synthdef::{self, Def, Role};

/// Hardware output bus
pub const HARDWARE_OUT: &str = "0";

/// Definitions and statements for the audio graph
#[derive(Debug, Default)]
pub struct Graph {
    pub definitions: Vec<Def>,
    /// `Bus.audio` allocations
    pub buses: Vec<String>,
    /// Effect synths in execution order
    pub effect_synths: Vec<String>,
    /// Modulator buses, synths and their mappings onto effects
    pub modulators: Vec<String>,
    names: HashMap<String, String>,
    categories: HashMap<String, NodeCategory>,
    destinations: HashMap<String, String>,
    mappings: HashMap<String, Vec<(String, String)>>,
}

impl Graph {
    /// Identifier for a node id
    pub fn name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Instrument definition for a node, when the node is one
    pub fn instrument_def(&self, id: &str) -> Option<&str> {
        match self.categories.get(id) {
            Some(NodeCategory::Instrument | NodeCategory::Unknown) => self.name(id),
            _ => None,
        }
    }

    /// Input bus of an effect node
    pub fn effect_bus(&self, id: &str) -> Option<String> {
        match self.categories.get(id) {
            Some(NodeCategory::Effect) => self.name(id).map(|n| format!("~bus_{}", n)),
            _ => None,
        }
    }

    pub fn category(&self, id: &str) -> Option<NodeCategory> {
        self.categories.get(id).copied()
    }

    /// Where a node's audio goes
    pub fn destination(&self, id: &str) -> String {
        self.destinations
            .get(id)
            .cloned()
            .unwrap_or_else(|| HARDWARE_OUT.to_string())
    }

    /// `(control, bus)` pairs a modulator maps onto an instrument node
    pub fn mappings(&self, id: &str) -> &[(String, String)] {
        self.mappings.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub fn plan(
    composition: &ResolvedComposition,
    names: &mut Names,
    server: &str,
    diagnostics: &mut Diagnostics,
) -> Graph {
    let mut graph = Graph::default();

    for (i, node) in composition.audio_graph.iter().enumerate() {
        let name = names.get(&node.id);
        let category = node.kind.category();
        graph.names.insert(node.id.clone(), name.clone());
        graph.categories.insert(node.id.clone(), category);

        match category {
            NodeCategory::Instrument | NodeCategory::Unknown => {
                let template = synthdef::instrument(&node.kind, &node.options).unwrap_or_else(|| {
                    diagnostics.push(
                        Diagnostic::warning(format!(
                            "unknown node type '{}', using a generic sine voice",
                            node.kind
                        ))
                        .with_path(format!("audioGraph[{}]", i)),
                    );
                    synthdef::generic_instrument(&node.options)
                });
                graph.definitions.push(Def {
                    name,
                    role: Role::Instrument,
                    template,
                });
            }
            NodeCategory::Effect => {
                if let Some(template) = synthdef::effect(&node.kind, &node.options) {
                    graph
                        .buses
                        .push(format!("~bus_{} = Bus.audio({}, 2);", name, server));
                    graph.definitions.push(Def {
                        name: format!("fx_{}", name),
                        role: Role::Effect,
                        template,
                    });
                }
            }
            NodeCategory::Modulator => {
                graph.definitions.push(Def {
                    name: format!("lfo_{}", name),
                    role: Role::Modulator,
                    template: synthdef::modulator(&node.options),
                });
                graph.modulators.extend([
                    format!("~lfo_bus_{} = Bus.control({}, 1);", name, server),
                    format!(
                        "~lfo_{n} = Synth.head({s}, \\lfo_{n}, [\\out, ~lfo_bus_{n}]);",
                        n = name,
                        s = server
                    ),
                ]);
            }
            NodeCategory::Sink => {}
        }
    }

    let mut started: Vec<String> = Vec::new();
    for (i, route) in composition.routes.iter().enumerate() {
        let path = format!("connections[{}]", i);
        let known = |id: &str| id == MASTER || graph.categories.contains_key(id);
        if let Some(missing) = [&route.source, &route.target]
            .into_iter()
            .find(|id| !known(id))
        {
            diagnostics.warning(
                path,
                format!("connection names unknown node '{}', skipped", missing),
            );
            continue;
        }

        let source = graph.category(&route.source);
        if !matches!(
            source,
            Some(NodeCategory::Instrument | NodeCategory::Unknown | NodeCategory::Effect)
        ) {
            diagnostics.warning(
                path,
                format!("'{}' has no audio output to route, skipped", route.source),
            );
            continue;
        }

        let target = if route.target == MASTER
            || graph.category(&route.target) == Some(NodeCategory::Sink)
        {
            HARDWARE_OUT.to_string()
        } else if let Some(bus) = graph.effect_bus(&route.target) {
            bus
        } else {
            diagnostics.warning(
                path,
                format!("cannot route audio into '{}', skipped", route.target),
            );
            continue;
        };

        if graph.destinations.contains_key(&route.source) {
            diagnostics.warning(
                path,
                format!(
                    "'{}' is already routed, only its first connection is used",
                    route.source
                ),
            );
            continue;
        }
        graph
            .destinations
            .insert(route.source.clone(), target.clone());

        if graph.effect_bus(&route.source).is_some() {
            started.push(route.source.clone());
            let line = effect_synth(&graph, &route.source, &target, server);
            graph.effect_synths.extend(line);
        }
    }

    // effects nobody routed onward still play to the hardware output
    for node in &composition.audio_graph {
        if graph.effect_bus(&node.id).is_some() && !started.contains(&node.id) {
            debug!(node = %node.id, "effect has no outgoing connection, sending to output");
            let line = effect_synth(&graph, &node.id, HARDWARE_OUT, server);
            graph.effect_synths.extend(line);
        }
    }

    for (i, node) in composition.audio_graph.iter().enumerate() {
        if node.kind != NodeKind::Lfo {
            continue;
        }
        map_modulator(&mut graph, i, &node.id, node.target.as_deref(), diagnostics);
    }

    graph
}

fn effect_synth(graph: &Graph, id: &str, out: &str, server: &str) -> Option<String> {
    let name = graph.name(id)?;
    Some(format!(
        "~fx_{n} = Synth.tail({s}, \\fx_{n}, [\\in, ~bus_{n}, \\out, {o}]);",
        n = name,
        s = server,
        o = out
    ))
}

/// Point a modulator at `node.param`: effects get a bus mapping now,
/// instruments get one in every pattern that plays them
fn map_modulator(
    graph: &mut Graph,
    index: usize,
    id: &str,
    target: Option<&str>,
    diagnostics: &mut Diagnostics,
) {
    let path = format!("audioGraph[{}].target", index);
    let Some((node, param)) = target.and_then(|t| t.split_once('.')) else {
        diagnostics.warning(
            path,
            format!("modulator '{}' needs a '<node>.<parameter>' target", id),
        );
        return;
    };
    let param = identifier(param.rsplit('.').next().unwrap_or(param));
    let Some(lfo) = graph.name(id).map(str::to_string) else {
        return;
    };
    let bus = format!("~lfo_bus_{}", lfo);

    match graph.category(node) {
        Some(NodeCategory::Effect) if graph.effect_bus(node).is_some() => {
            if let Some(fx) = graph.name(node).map(str::to_string) {
                graph
                    .modulators
                    .push(format!("~fx_{}.map(\\{}, {});", fx, param, bus));
            }
        }
        Some(NodeCategory::Instrument | NodeCategory::Unknown) => {
            graph
                .mappings
                .entry(node.to_string())
                .or_default()
                .push((param, bus));
        }
        _ => diagnostics.warning(
            path,
            format!("modulator '{}' targets unknown node '{}'", id, node),
        ),
    }
}
