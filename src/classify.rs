use crate::domain::ResultType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub result_type: ResultType,
    /// Only set for measures.
    pub is_bond: Option<bool>,
}

/// Decides whether a row is a ballot measure choice or a candidate.
///
/// A choice literally named "yes" or "no", or mentioning a bond, is a
/// measure. Measures whose contest title mentions a bond are bond measures.
/// A candidate called "Yes" is therefore reported as a measure.
pub fn classify(title: &str, choice_name: &str) -> Classification {
    let choice = choice_name.to_lowercase();
    let is_measure = choice == "yes" || choice == "no" || mentions_bond(&choice);
    if !is_measure {
        return Classification {
            result_type: ResultType::Candidate,
            is_bond: None,
        };
    }

    Classification {
        result_type: ResultType::Measure,
        is_bond: Some(mentions_bond(&title.to_lowercase())),
    }
}

// "bonds" contains "bond"
fn mentions_bond(lowered: &str) -> bool {
    lowered.contains("bond")
}
