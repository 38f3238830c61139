//! Role vocabulary and the context handed to a generator.

use serde::{Deserialize, Serialize};

use crate::config::OutputType;
use crate::domain::{Draft, ReviewResult};

/// Auxiliary participants consulted before drafting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeholderId {
    /// Ministry of Finance.
    GovMof,
    /// Ministry of Agriculture.
    GovMoa,
    /// Country team economist.
    CdtEcon,
    /// Country team technical specialist.
    CdtTech,
}

/// Consultation order: government first, then the country team.
pub const STAKEHOLDERS: [StakeholderId; 4] = [
    StakeholderId::GovMof,
    StakeholderId::GovMoa,
    StakeholderId::CdtEcon,
    StakeholderId::CdtTech,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeholderGroup {
    Government,
    CountryTeam,
}

impl StakeholderId {
    /// Profile / graph node id.
    pub fn node_id(&self) -> &'static str {
        match self {
            StakeholderId::GovMof => "gov_mof",
            StakeholderId::GovMoa => "gov_moa",
            StakeholderId::CdtEcon => "cdt_econ",
            StakeholderId::CdtTech => "cdt_tech",
        }
    }

    pub fn group(&self) -> StakeholderGroup {
        match self {
            StakeholderId::GovMof | StakeholderId::GovMoa => StakeholderGroup::Government,
            StakeholderId::CdtEcon | StakeholderId::CdtTech => StakeholderGroup::CountryTeam,
        }
    }

    /// Retrieval query used to gather this stakeholder's evidence.
    pub fn retrieval_query(&self) -> &'static str {
        match self {
            StakeholderId::GovMof => "country priorities policy strategy constraints fiscal space",
            StakeholderId::GovMoa => "country priorities agriculture food systems youth employment",
            StakeholderId::CdtEcon => "macro economic context poverty trends fiscal space",
            StakeholderId::CdtTech => "technical feasibility safeguards climate secap",
        }
    }
}

impl std::fmt::Display for StakeholderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.node_id())
    }
}

/// A participant in the drafting protocol.
///
/// Only `Writer` and `Reviewer` take part in the round state machine;
/// stakeholders contribute context and never gate acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Role {
    Writer,
    Reviewer,
    Stakeholder(StakeholderId),
}

impl Role {
    /// Graph node ids animated while this role is working.
    pub fn node_ids(&self) -> Vec<&'static str> {
        match self {
            Role::Writer => vec!["cd"],
            Role::Reviewer => vec!["ren", "ode"],
            Role::Stakeholder(id) => vec![id.node_id()],
        }
    }

    pub fn retrieval_query(&self) -> &'static str {
        match self {
            Role::Writer => "strategy objectives implementation risks safeguards inclusion",
            Role::Reviewer => "policy alignment results chain compliance safeguards evidence",
            Role::Stakeholder(id) => id.retrieval_query(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Writer => write!(f, "writer"),
            Role::Reviewer => write!(f, "reviewer"),
            Role::Stakeholder(id) => write!(f, "stakeholder:{id}"),
        }
    }
}

/// Guidance produced by a stakeholder consult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeholderNotes {
    pub stakeholder: StakeholderId,
    pub notes: String,
    pub cited_evidence_ids: Vec<String>,
}

/// What a generator returns; the caller checks the variant against the role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Generation {
    Draft(Draft),
    Review(ReviewResult),
    Notes(StakeholderNotes),
}

impl Generation {
    pub fn kind(&self) -> &'static str {
        match self {
            Generation::Draft(_) => "draft",
            Generation::Review(_) => "review",
            Generation::Notes(_) => "notes",
        }
    }
}

/// Project-level facts shared by every agent turn of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectBrief {
    pub title: Option<String>,
    pub country: Option<String>,
    pub user_notes: String,
}

/// A retrieved chunk as presented to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceExcerpt {
    pub chunk_id: String,
    pub source_name: String,
    pub text: String,
    pub score: f64,
}

/// Everything a generator may read for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub candidate_id: String,
    pub round_number: u32,
    pub output_type: OutputType,
    pub brief: ProjectBrief,
    /// Role instruction template.
    pub instruction: String,
    pub evidence: Vec<EvidenceExcerpt>,
    /// Draft under revision (writer) or under review (reviewer).
    pub prior_draft: Option<Draft>,
    pub guidance: Vec<StakeholderNotes>,
    /// Formatted comments from the previous round's review.
    pub revision_notes: Option<String>,
}

impl AgentContext {
    pub fn new(candidate_id: impl Into<String>, round_number: u32, output_type: OutputType) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            round_number,
            output_type,
            brief: ProjectBrief::default(),
            instruction: String::new(),
            evidence: Vec::new(),
            prior_draft: None,
            guidance: Vec::new(),
            revision_notes: None,
        }
    }

    /// Guidance notes joined under stakeholder headers.
    pub fn guidance_text(&self) -> String {
        self.guidance
            .iter()
            .map(|g| format!("[{}]\n{}", g.stakeholder, g.notes.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
