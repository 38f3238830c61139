//! Deterministic, backend-free [`ContentGenerator`].
//!
//! The writer renders the output type's section template from evidence and
//! stakeholder guidance; the reviewer applies keyword and structure checks
//! covering both the quality/compliance and the independent-evaluation
//! checklists. Output depends only on the context, so runs are reproducible.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::profiles::{section_template, stakeholder_profile, EVIDENCE_ANNEX_HEADING};
use super::roles::{AgentContext, Generation, Role, StakeholderGroup, StakeholderId, StakeholderNotes};
use super::ContentGenerator;
use crate::domain::{
    CheckStatus, CheckboxStatus, Draft, GenerationError, ReviewComment, ReviewResult, Severity,
    Verdict,
};

/// Word count the reviewer requires by default.
pub const DEFAULT_MIN_WORDS: usize = 800;

const EXCERPT_CHARS: usize = 700;

const FILLER: &[&str] = &[
    "The programme will prioritise smallholder producers and their organisations as the main channel for sustained rural income growth.",
    "Partnerships with national agencies, local governments and producer groups will anchor delivery and ownership at every level.",
    "Lessons from previous operations point to the value of simple designs, early capacity building and continuous field supervision.",
    "Targeting will combine geographic selection of the poorest districts with direct outreach to women, youth and landless households.",
    "Climate resilience will be integrated across investments through water management, diversified cropping and improved extension services.",
    "Monitoring will track outcome indicators at household level and feed findings back into annual planning and budgeting cycles.",
    "Knowledge management will capture field practice and share it with government counterparts to inform wider policy dialogue.",
    "Access to rural finance will be broadened through savings groups, digital channels and linkages with commercial lenders.",
    "Market linkages will connect producer organisations with buyers, processors and public procurement programmes in the region.",
    "Institutional strengthening will focus on planning, procurement and financial management capacities of the lead agencies.",
    "Gender transformative approaches will address unequal workloads and decision making within households and community institutions.",
    "Nutrition sensitive agriculture will promote diverse diets through home gardens, small livestock and targeted behaviour change activities.",
];

fn word_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").expect("static word pattern compiles"))
}

fn code_span_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`]*`").expect("static code span pattern compiles"))
}

fn discriminatory_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [r"(?i)\b(inferior|superior)\b", r"(?i)\b(race-based|racially inferior)\b"]
            .iter()
            .map(|p| Regex::new(p).expect("static screening pattern compiles"))
            .collect()
    })
}

/// Words as the reviewer counts them: inline code spans excluded.
pub fn count_words(text: &str) -> usize {
    let stripped = code_span_pattern().replace_all(text, "");
    word_pattern().find_iter(&stripped).count()
}

/// How a candidate's first, unrevised draft deviates from a complete one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirstDraft {
    Complete,
    Short,
    NoImplementationSection,
}

impl FirstDraft {
    fn for_candidate(candidate_id: &str) -> Self {
        use sha2::Digest as _;
        match sha2::Sha256::digest(candidate_id.as_bytes())[0] % 3 {
            0 => FirstDraft::Complete,
            1 => FirstDraft::Short,
            _ => FirstDraft::NoImplementationSection,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicGenerator {
    min_words: usize,
}

impl Default for HeuristicGenerator {
    fn default() -> Self {
        Self {
            min_words: DEFAULT_MIN_WORDS,
        }
    }
}

impl HeuristicGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the reviewer's word threshold (the writer targets it too).
    pub fn with_min_words(mut self, min_words: usize) -> Self {
        self.min_words = min_words;
        self
    }

    pub fn min_words(&self) -> usize {
        self.min_words
    }

    fn write(&self, ctx: &AgentContext) -> Draft {
        let revising = ctx.revision_notes.is_some() || ctx.round_number > 1;
        let variant = if revising {
            FirstDraft::Complete
        } else {
            FirstDraft::for_candidate(&ctx.candidate_id)
        };
        let target = match variant {
            FirstDraft::Short => self.min_words / 2,
            _ => self.min_words + self.min_words / 20,
        };

        let label = ctx.output_type.label();
        let title = ctx
            .brief
            .title
            .clone()
            .unwrap_or_else(|| format!("Untitled {label}"));
        let country = ctx
            .brief
            .country
            .clone()
            .unwrap_or_else(|| "Unknown country".to_string());

        let mut preamble = vec![format!("# {label}: {title}"), format!("Country: {country}")];
        if let Some(notes) = ctx.revision_notes.as_deref().filter(|n| !n.trim().is_empty()) {
            preamble.push(format!(
                "Revision {} responds to the following review comments:\n{}",
                ctx.round_number,
                notes.trim()
            ));
        }

        let guidance = ctx.guidance_text();
        let mut sections: Vec<(String, Vec<String>)> = section_template(ctx.output_type)
            .iter()
            .filter(|h| {
                !(variant == FirstDraft::NoImplementationSection
                    && **h == "Implementation arrangements")
            })
            .enumerate()
            .map(|(i, heading)| {
                let mut body = vec![lead_sentence(heading, &country)];
                if let Some((n, ev)) = ctx
                    .evidence
                    .iter()
                    .enumerate()
                    .nth(i % ctx.evidence.len().max(1))
                    .filter(|_| !ctx.evidence.is_empty())
                {
                    body.push(format!(
                        "Evidence from {} indicates that {} [E{}].",
                        ev.source_name,
                        first_sentence(&ev.text).trim_end_matches('.'),
                        n + 1
                    ));
                }
                if i == 0 && !guidance.is_empty() {
                    body.push(format!(
                        "Stakeholder consultations informed this section:\n{guidance}"
                    ));
                }
                if i == 0 && !ctx.brief.user_notes.trim().is_empty() {
                    body.push(format!(
                        "Design team notes: {}",
                        ctx.brief.user_notes.trim()
                    ));
                }
                (heading.to_string(), body)
            })
            .collect();

        let annex: Vec<String> = ctx
            .evidence
            .iter()
            .enumerate()
            .map(|(i, ev)| {
                let excerpt: String = ev.text.chars().take(EXCERPT_CHARS).collect();
                format!(
                    "[E{}] ({}) {} ({})",
                    i + 1,
                    ev.source_name,
                    excerpt.trim(),
                    ev.chunk_id
                )
            })
            .collect();

        let mut words: usize = preamble.iter().map(|p| count_words(p)).sum::<usize>()
            + sections
                .iter()
                .map(|(h, b)| count_words(h) + b.iter().map(|s| count_words(s)).sum::<usize>())
                .sum::<usize>()
            + count_words(EVIDENCE_ANNEX_HEADING)
            + annex.iter().map(|a| count_words(a)).sum::<usize>();

        let mut k = 0;
        while words < target && !sections.is_empty() {
            let sentence = FILLER[k % FILLER.len()];
            let slot = k % sections.len();
            sections[slot].1.push(sentence.to_string());
            words += count_words(sentence);
            k += 1;
        }

        let mut body = preamble.join("\n\n");
        for (heading, paras) in &sections {
            body.push_str(&format!("\n\n## {heading}\n\n{}", paras.join(" ")));
        }
        body.push_str(&format!("\n\n## {EVIDENCE_ANNEX_HEADING}\n\n"));
        if annex.is_empty() {
            body.push_str("(No evidence retrieved.)");
        } else {
            body.push_str(&annex.join("\n\n"));
        }

        let cited = ctx.evidence.iter().map(|e| e.chunk_id.clone()).collect();
        Draft::new(ctx.candidate_id.clone(), ctx.round_number, body, cited)
    }

    fn review(&self, ctx: &AgentContext) -> Result<ReviewResult, GenerationError> {
        let draft = ctx
            .prior_draft
            .as_ref()
            .ok_or_else(|| GenerationError::Malformed("no draft to review".into()))?;
        let text = &draft.body_text;
        let lower = text.to_lowercase();
        let mut checklist = Vec::with_capacity(10);
        let mut comments = Vec::new();

        // Quality and compliance.
        let has_results = lower.contains("theory of change") || lower.contains("results");
        let has_impl = lower.contains("implementation arrangements");
        let has_risks = lower.contains("risk") || lower.contains("mitigation");
        let has_policy = lower.contains("ifad") || lower.contains("strategic");
        let has_compliance = lower.contains("safeguard") || lower.contains("compliance");

        if !has_results {
            comments.push(
                ReviewComment::new(Severity::Major, "Results", "Results chain or theory of change is unclear.")
                    .with_suggestion("Clarify the results chain and outcomes in the strategic objectives section."),
            );
        }
        if !has_impl {
            comments.push(
                ReviewComment::new(Severity::Major, "Implementation", "Implementation capacity is not explicit.")
                    .with_suggestion("Detail implementation arrangements and partner capacities."),
            );
        }
        if !has_risks {
            comments.push(
                ReviewComment::new(Severity::Major, "Risk", "Risks and mitigation are not sufficiently covered.")
                    .with_suggestion("Strengthen the risks and mitigation section with concrete actions."),
            );
        }

        checklist.push(check(
            "policy_alignment",
            "Aligned with corporate policy and strategy mandate",
            if has_policy { CheckStatus::True } else { CheckStatus::Partial },
            if has_policy { "Detected strategic alignment language." } else { "Limited policy alignment cues found." },
        ));
        checklist.push(check(
            "results_chain",
            "Results chain / theory of change is clear",
            pass_fail(has_results),
            if has_results { "Results chain language detected." } else { "Missing results chain language." },
        ));
        checklist.push(check(
            "implementation_capacity",
            "Implementation capacity is addressed",
            pass_fail(has_impl),
            if has_impl { "Implementation arrangements section found." } else { "Implementation details missing." },
        ));
        checklist.push(check(
            "risk_mitigation",
            "Risk mitigation measures are included",
            pass_fail(has_risks),
            if has_risks { "Risk/mitigation language detected." } else { "No explicit risk mitigation." },
        ));
        checklist.push(check(
            "compliance_quality",
            "Compliance and quality safeguards are addressed",
            if has_compliance { CheckStatus::True } else { CheckStatus::Partial },
            if has_compliance { "Safeguards/compliance language detected." } else { "No clear compliance statements." },
        ));

        // Independent evaluation.
        let words = count_words(text);
        let required: [(&str, &[&str]); 4] = [
            ("Country context", &["country context"]),
            ("Strategic objectives / theory of change", &["strategic objectives", "theory of change"]),
            ("Implementation arrangements", &["implementation arrangements", "implementation"]),
            ("Risks and mitigation", &["risks", "mitigation"]),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, terms)| !terms.iter().any(|t| lower.contains(t)))
            .map(|(name, _)| *name)
            .collect();
        let flagged = discriminatory_patterns().iter().any(|re| re.is_match(text));
        let has_evidence = lower.contains(&EVIDENCE_ANNEX_HEADING.to_lowercase()) && lower.contains("[e1]");
        let has_safeguards = lower.contains("safeguards");

        if words < self.min_words {
            comments.push(
                ReviewComment::new(
                    Severity::Major,
                    "Overall",
                    format!("Draft is likely under-developed (word_count={words})."),
                )
                .with_suggestion("Expand country context, lessons learned, and implementation arrangements with more evidence."),
            );
        }
        if !missing.is_empty() {
            comments.push(
                ReviewComment::new(
                    Severity::Blocker,
                    "Structure",
                    format!("Missing required sections: {}", missing.join(", ")),
                )
                .with_suggestion("Add the missing sections using the template headings."),
            );
        }
        if flagged {
            comments.push(
                ReviewComment::new(Severity::Blocker, "Compliance", "Potential discriminatory or inappropriate language detected.")
                    .with_suggestion("Rewrite to ensure inclusive, non-discriminatory language."),
            );
        }
        if !has_evidence {
            comments.push(
                ReviewComment::new(Severity::Major, "Evidence", "No evidence excerpts/citations detected in the annex.")
                    .with_suggestion("Include excerpts from uploaded materials and internal references."),
            );
        }

        checklist.push(check(
            "word_count",
            &format!("Word count meets threshold (>= {} words)", self.min_words),
            pass_fail(words >= self.min_words),
            &format!("Detected approximately {words} words."),
        ));
        checklist.push(check(
            "structure",
            "Includes core sections (context, objectives/ToC, implementation, risks)",
            pass_fail(missing.is_empty()),
            &if missing.is_empty() {
                "All required headings present.".to_string()
            } else {
                format!("Missing: {}", missing.join(", "))
            },
        ));
        checklist.push(check(
            "inclusion",
            "Inclusive / non-discriminatory language",
            pass_fail(!flagged),
            if flagged { "Flagged terms matched screening patterns." } else { "No flagged discriminatory terms found." },
        ));
        checklist.push(check(
            "safeguards",
            "Mentions safeguards / inclusion risk mitigation",
            if has_safeguards { CheckStatus::True } else { CheckStatus::Partial },
            if has_safeguards {
                "Detected safeguards language."
            } else {
                "No explicit safeguards keyword found; may need strengthening."
            },
        ));
        checklist.push(check(
            "evidence",
            "Provides evidence excerpts/citations from inputs",
            pass_fail(has_evidence),
            if has_evidence { "Evidence annex includes at least one excerpt." } else { "No evidence excerpts detected." },
        ));

        let passed = checklist.iter().all(|c| c.status != CheckStatus::False)
            && !comments.iter().any(|c| c.severity == Severity::Blocker);

        Ok(ReviewResult {
            candidate_id: ctx.candidate_id.clone(),
            round_number: draft.round_number,
            checklist,
            comments,
            metrics: Vec::new(),
            verdict: if passed { Verdict::Accept } else { Verdict::Revise },
        })
    }

    fn consult(&self, id: StakeholderId, ctx: &AgentContext) -> StakeholderNotes {
        let profile = stakeholder_profile(id);
        let headings: [&str; 3] = match id.group() {
            StakeholderGroup::Government => ["Priorities", "Constraints", "Endorsement conditions"],
            StakeholderGroup::CountryTeam => ["Key risks", "Feasibility concerns", "Suggested revisions"],
        };

        let mut cited = Vec::new();
        let mut lines = Vec::new();
        for (i, heading) in headings.iter().enumerate() {
            lines.push(format!("{heading}:"));
            let focus = profile.responsibilities.get(i).copied().unwrap_or(profile.label);
            match ctx.evidence.get(i) {
                Some(ev) => {
                    lines.push(format!(
                        "- {focus}: {} ({})",
                        first_sentence(&ev.text),
                        ev.source_name
                    ));
                    cited.push(ev.chunk_id.clone());
                }
                None => lines.push(format!("- {focus}: no supporting evidence retrieved.")),
            }
        }

        StakeholderNotes {
            stakeholder: id,
            notes: lines.join("\n"),
            cited_evidence_ids: cited,
        }
    }
}

#[async_trait]
impl ContentGenerator for HeuristicGenerator {
    async fn generate(&self, role: &Role, ctx: &AgentContext) -> Result<Generation, GenerationError> {
        match role {
            Role::Writer => Ok(Generation::Draft(self.write(ctx))),
            Role::Reviewer => self.review(ctx).map(Generation::Review),
            Role::Stakeholder(id) => Ok(Generation::Notes(self.consult(*id, ctx))),
        }
    }
}

fn check(id: &str, label: &str, status: CheckStatus, rationale: &str) -> CheckboxStatus {
    CheckboxStatus::new(id, label, status, rationale)
}

fn pass_fail(ok: bool) -> CheckStatus {
    if ok {
        CheckStatus::True
    } else {
        CheckStatus::False
    }
}

fn lead_sentence(heading: &str, country: &str) -> String {
    let h = heading.to_lowercase();
    if h.starts_with("country context") {
        format!("{country} faces persistent rural poverty, exposure to climate shocks and uneven access to markets and services.")
    } else if h.starts_with("strategic objectives") {
        "The strategic objectives follow a theory of change in which productive investments raise incomes and resilience, leading to measurable results for poor rural households.".to_string()
    } else if h.starts_with("implementation") {
        "Implementation arrangements rely on a lead ministry, a programme management unit and decentralised delivery through local partners.".to_string()
    } else if h.starts_with("risks") {
        "Key risks include climate variability, weak institutional capacity and fiscal pressure; mitigation relies on environmental and social safeguards, phased financing and capacity support.".to_string()
    } else if h.starts_with("safeguards") {
        "Environmental and social safeguards and compliance procedures apply to every investment, with grievance mechanisms open to all participants.".to_string()
    } else if h.starts_with("lessons") {
        "Past operations show that community ownership and realistic timelines drive sustained results.".to_string()
    } else if h.starts_with("target groups") {
        "Target groups are smallholder farmers, rural women and youth, and marginalised communities in the poorest districts.".to_string()
    } else if h.starts_with("results") {
        "Results will be tracked through a logical framework with baseline, midline and completion surveys.".to_string()
    } else if h.starts_with("financing") {
        "Financing combines concessional loans, grants and counterpart contributions phased against performance.".to_string()
    } else {
        format!("This section sets out the {h} for {country}.")
    }
}

/// First sentence of `text`, flattened to one line and capped at 40 words.
fn first_sentence(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let end = flat.find(". ").map(|i| i + 1).unwrap_or(flat.len());
    let sentence = &flat[..end];
    let words: Vec<&str> = sentence.split(' ').collect();
    if words.len() > 40 {
        format!("{}...", words[..40].join(" "))
    } else {
        sentence.to_string()
    }
}
