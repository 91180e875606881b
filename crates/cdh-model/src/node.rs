use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Typed node kinds in the harmonized data model.
///
/// Structural nodes (`Study`, `ConsentGroup`, `ReferenceFile`, `Participant`)
/// carry the graph's shape; the rest are observation nodes attached to a
/// participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    ConsentGroup,
    Diagnosis,
    GeneticAnalysis,
    LaboratoryTest,
    Participant,
    ReferenceFile,
    Study,
    Survival,
    Synonym,
    Treatment,
    TreatmentResponse,
}

impl NodeType {
    /// All node types, in stable output order.
    pub const ALL: [NodeType; 11] = [
        NodeType::ConsentGroup,
        NodeType::Diagnosis,
        NodeType::GeneticAnalysis,
        NodeType::LaboratoryTest,
        NodeType::Participant,
        NodeType::ReferenceFile,
        NodeType::Study,
        NodeType::Survival,
        NodeType::Synonym,
        NodeType::Treatment,
        NodeType::TreatmentResponse,
    ];

    /// Node types representing clinical events/measurements attached to a
    /// participant, as opposed to structural nodes.
    pub const OBSERVATIONS: [NodeType; 7] = [
        NodeType::Diagnosis,
        NodeType::GeneticAnalysis,
        NodeType::LaboratoryTest,
        NodeType::Survival,
        NodeType::Synonym,
        NodeType::Treatment,
        NodeType::TreatmentResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::ConsentGroup => "consent_group",
            NodeType::Diagnosis => "diagnosis",
            NodeType::GeneticAnalysis => "genetic_analysis",
            NodeType::LaboratoryTest => "laboratory_test",
            NodeType::Participant => "participant",
            NodeType::ReferenceFile => "reference_file",
            NodeType::Study => "study",
            NodeType::Survival => "survival",
            NodeType::Synonym => "synonym",
            NodeType::Treatment => "treatment",
            NodeType::TreatmentResponse => "treatment_response",
        }
    }

    pub fn parse(name: &str) -> Result<NodeType> {
        NodeType::ALL
            .into_iter()
            .find(|n| n.as_str() == name)
            .ok_or_else(|| ModelError::UnknownNodeType(name.to_string()))
    }

    /// Pluralized collection name used in harmonized output, e.g.
    /// `diagnosis` => `diagnoses`, `study` => `studies`.
    pub fn plural(self) -> String {
        let name = self.as_str();
        if let Some(stem) = name.strip_suffix("is") {
            return format!("{stem}es");
        }
        if let Some(stem) = name.strip_suffix('y') {
            return format!("{stem}ies");
        }
        format!("{name}s")
    }

    /// Name of the node's own id property, e.g. `participant_id`.
    pub fn id_field(self) -> String {
        format!("{}_id", self.as_str())
    }

    /// Fully qualified id field used for relationship references on other
    /// nodes, e.g. `participant.participant_id` on a diagnosis record.
    pub fn qualified_id_field(self) -> String {
        format!("{0}.{0}_id", self.as_str())
    }

    pub fn is_observation(self) -> bool {
        NodeType::OBSERVATIONS.contains(&self)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::NodeType;

    #[test]
    fn plural_forms() {
        assert_eq!(NodeType::Diagnosis.plural(), "diagnoses");
        assert_eq!(NodeType::GeneticAnalysis.plural(), "genetic_analyses");
        assert_eq!(NodeType::Study.plural(), "studies");
        assert_eq!(NodeType::Participant.plural(), "participants");
        assert_eq!(NodeType::TreatmentResponse.plural(), "treatment_responses");
    }

    #[test]
    fn id_fields() {
        assert_eq!(NodeType::Participant.id_field(), "participant_id");
        assert_eq!(
            NodeType::ConsentGroup.qualified_id_field(),
            "consent_group.consent_group_id"
        );
    }

    #[test]
    fn parse_round_trips() {
        for node_type in NodeType::ALL {
            assert_eq!(NodeType::parse(node_type.as_str()).unwrap(), node_type);
        }
        assert!(NodeType::parse("sample").is_err());
    }
}
