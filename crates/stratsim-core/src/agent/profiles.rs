//! Static agent catalogue, stakeholder topology, and document templates.

use serde::Serialize;
use serde_json::{json, Value};

use super::roles::{Role, StakeholderId};
use crate::config::OutputType;

/// Describes one participant in the drafting protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProfile {
    pub id: &'static str,
    pub label: &'static str,
    pub responsibilities: &'static [&'static str],
    pub instruction: &'static str,
    /// Knowledge scopes this agent may retrieve from.
    pub allowed_scopes: &'static [&'static str],
}

pub const PROFILES: [AgentProfile; 7] = [
    AgentProfile {
        id: "cd",
        label: "Country Director",
        responsibilities: &["Strategy alignment", "Orchestration", "Final draft"],
        instruction: "You are the Country Director. Coordinate drafting, align with corporate \
            strategy and the SDGs, and synthesize government priorities and country team inputs \
            into a coherent draft.",
        allowed_scopes: &["public", "ifad", "government", "technical", "project"],
    },
    AgentProfile {
        id: "cdt_econ",
        label: "CDT Economist",
        responsibilities: &["Macro context", "Economic feasibility", "Results chain realism"],
        instruction: "You are the country team economist. Focus on macro context, growth drivers, \
            rural poverty data, and economic feasibility of the results chain.",
        allowed_scopes: &["public", "ifad", "government", "project"],
    },
    AgentProfile {
        id: "cdt_tech",
        label: "CDT Technical",
        responsibilities: &["Technical feasibility", "Safeguards", "Operational risks"],
        instruction: "You are the country team technical specialist. Focus on technical \
            feasibility, climate and safeguards, and operational realism.",
        allowed_scopes: &["public", "ifad", "technical", "project"],
    },
    AgentProfile {
        id: "gov_mof",
        label: "Ministry of Finance",
        responsibilities: &["National priorities", "Fiscal constraints", "Endorsement conditions"],
        instruction: "You represent the Ministry of Finance. Emphasize national development \
            priorities, fiscal space, policy alignment, and endorsement conditions.",
        allowed_scopes: &["public", "government", "project"],
    },
    AgentProfile {
        id: "gov_moa",
        label: "Ministry of Agriculture",
        responsibilities: &["Agriculture priorities", "Food systems", "Youth employment"],
        instruction: "You represent the Ministry of Agriculture. Emphasize rural development \
            priorities, food systems, youth and employment, and institutional capacity.",
        allowed_scopes: &["public", "government", "project"],
    },
    AgentProfile {
        id: "ren",
        label: "REN Reviewer",
        responsibilities: &["Quality control", "Compliance", "Results chain"],
        instruction: "Provide quality and compliance review focused on results chain, \
            safeguards, policy alignment, and implementation capacity.",
        allowed_scopes: &["public", "ifad", "compliance", "project"],
    },
    AgentProfile {
        id: "ode",
        label: "ODE Reviewer",
        responsibilities: &["Independent review", "Evidence quality", "Risk mitigation"],
        instruction: "Provide an independent review focusing on quality, compliance, and \
            evidence use.",
        allowed_scopes: &["public", "ifad", "compliance", "project"],
    },
];

/// Knowledge-base folder names and the scopes their documents are tagged with.
pub const KNOWLEDGE_BASE_FOLDERS: [(&str, &[&str]); 9] = [
    ("public", &["public", "historical_cosop"]),
    ("government", &["government"]),
    ("gov_mof", &["government"]),
    ("gov_moa", &["government"]),
    ("cd", &["ifad"]),
    ("cdt_econ", &["ifad", "technical"]),
    ("cdt_tech", &["technical"]),
    ("ren", &["compliance"]),
    ("ode", &["compliance"]),
];

pub fn knowledge_base_scopes(folder: &str) -> Option<&'static [&'static str]> {
    KNOWLEDGE_BASE_FOLDERS
        .iter()
        .find(|(name, _)| *name == folder)
        .map(|(_, scopes)| *scopes)
}

pub fn profile(id: &str) -> Option<&'static AgentProfile> {
    PROFILES.iter().find(|p| p.id == id)
}

pub fn stakeholder_profile(id: StakeholderId) -> &'static AgentProfile {
    match id {
        StakeholderId::GovMof => &PROFILES[3],
        StakeholderId::GovMoa => &PROFILES[4],
        StakeholderId::CdtEcon => &PROFILES[1],
        StakeholderId::CdtTech => &PROFILES[2],
    }
}

/// Instruction template for a role. The reviewer merges both review profiles.
pub fn instruction_for(role: &Role) -> String {
    match role {
        Role::Writer => PROFILES[0].instruction.to_string(),
        Role::Reviewer => format!("{}\n\n{}", PROFILES[5].instruction, PROFILES[6].instruction),
        Role::Stakeholder(id) => stakeholder_profile(*id).instruction.to_string(),
    }
}

/// Retrieval scopes for a role (union of its profiles' scopes).
pub fn scopes_for(role: &Role) -> Vec<&'static str> {
    let mut scopes: Vec<&'static str> = Vec::new();
    for node in role.node_ids() {
        if let Some(p) = profile(node) {
            for s in p.allowed_scopes {
                if !scopes.contains(s) {
                    scopes.push(s);
                }
            }
        }
    }
    scopes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub id: &'static str,
    pub source: &'static str,
    pub target: &'static str,
    pub label: &'static str,
}

pub const EDGES: [GraphEdge; 6] = [
    GraphEdge { id: "gov-cd", source: "gov_mof", target: "cd", label: "priorities" },
    GraphEdge { id: "gov2-cd", source: "gov_moa", target: "cd", label: "priorities" },
    GraphEdge { id: "cdt-cd", source: "cdt_econ", target: "cd", label: "technical review" },
    GraphEdge { id: "cdt2-cd", source: "cdt_tech", target: "cd", label: "technical review" },
    GraphEdge { id: "ren-cd", source: "ren", target: "cd", label: "quality review" },
    GraphEdge { id: "ode-cd", source: "ode", target: "cd", label: "evaluation" },
];

/// Node status values carried by `graph_update` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Idle,
    Consulting,
    Writing,
    Reviewing,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Consulting => "consulting",
            NodeStatus::Writing => "writing",
            NodeStatus::Reviewing => "reviewing",
        }
    }
}

/// Full topology payload: every node idle plus the static edges.
pub fn topology() -> Value {
    let nodes: Vec<Value> = PROFILES
        .iter()
        .map(|p| json!({"id": p.id, "label": p.label, "status": NodeStatus::Idle.as_str()}))
        .collect();
    json!({ "nodes": nodes, "edges": EDGES })
}

/// Status-only payload for a set of nodes.
pub fn node_status(nodes: &[&str], status: NodeStatus) -> Value {
    let map: serde_json::Map<String, Value> = nodes
        .iter()
        .map(|n| (n.to_string(), Value::from(status.as_str())))
        .collect();
    json!({ "node_status": map })
}

pub const EVIDENCE_ANNEX_HEADING: &str = "Annex: Evidence excerpts";

/// Section headings the writer fills, in order.
pub fn section_template(output_type: OutputType) -> &'static [&'static str] {
    match output_type {
        OutputType::Cosop => &[
            "Country context",
            "Lessons learned",
            "Strategic objectives and theory of change",
            "Target groups and targeting",
            "Implementation arrangements",
            "Risks and mitigation",
            "Results management",
        ],
        OutputType::Pcn => &[
            "Country context",
            "Project rationale",
            "Strategic objectives and theory of change",
            "Target groups",
            "Implementation arrangements",
            "Risks and mitigation",
        ],
        OutputType::Pdr => &[
            "Country context",
            "Project description",
            "Strategic objectives and theory of change",
            "Implementation arrangements",
            "Financing",
            "Risks and mitigation",
            "Safeguards and compliance",
        ],
    }
}
