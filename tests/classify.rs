use era_results::classify::classify;
use era_results::domain::ResultType;

#[test]
fn measure_choices_in_any_casing() {
    let choices = ["yes", "Yes", "YES", "yEs", "no", "No", "NO", "nO"];
    for choice in choices {
        assert_eq!(classify("Any Title", choice).result_type, ResultType::Measure);
    }
}

#[test]
fn bond_mentions_in_choice_are_measures() {
    for choice in ["Bond Yes", "BONDS", "for the bonds", "Rebond"] {
        assert_eq!(classify("Title", choice).result_type, ResultType::Measure, "{choice}");
    }
}

#[test]
fn bond_flag_follows_title_only() {
    let cases = [
        ("Measure A", "Yes", false),
        ("Measure A Bond", "Yes", true),
        ("SCHOOL BONDS", "no", true),
        ("Measure C", "Bonds Yes", false),
    ];
    for (title, choice, expected) in cases {
        assert_eq!(classify(title, choice).is_bond, Some(expected), "{title}/{choice}");
    }
}

#[test]
fn candidates_carry_no_bond_flag() {
    for choice in ["Alice", "Yes We Can", "Nora", "", "N/A"] {
        let result = classify("School Bond Board", choice);
        assert_eq!(result.result_type, ResultType::Candidate, "{choice}");
        assert_eq!(result.is_bond, None);
    }
}
