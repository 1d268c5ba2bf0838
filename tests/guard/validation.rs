use cogito::Config;
use cogito::guard::{RejectReason, StructuralValidator, ValidationResult};

fn validator() -> StructuralValidator {
    StructuralValidator::from_config(&Config::default().envelope).unwrap()
}

#[test]
fn reply_is_text_after_last_anchor() {
    let samples = [
        ("<THINK>a</THINK>Final answer: one", "one"),
        ("<THINK>final answer: draft</THINK>FINAL ANSWER: two ", "two"),
        ("＜THINK＞x＜/THINK＞Final answer：three", "three"),
    ];
    for (text, reply) in samples {
        match validator().validate(text) {
            ValidationResult::ThoughtAndReply { reply: got, .. } => assert_eq!(got, reply, "{text}"),
            other => panic!("{text}: {other:?}"),
        }
    }
}

#[test]
fn single_marker_without_anchor_is_rejected() {
    for text in ["<THINK>started", "ended</THINK> here", "《THINK》wide"] {
        assert_eq!(
            validator().validate(text),
            ValidationResult::Rejected {
                reason: RejectReason::UnanchoredEnvelope
            },
            "{text}"
        );
    }
}

#[test]
fn plain_text_passes_through_unchanged() {
    for text in [
        "Hello there.",
        "  spaced  ",
        "a < b and c > d",
        "I (think) that is right.",
        "Let me [think] about it.",
    ] {
        assert_eq!(
            validator().validate(text),
            ValidationResult::ReplyOnly {
                text: text.to_string()
            }
        );
    }
}

#[test]
fn prose_brackets_after_anchor_stay_in_reply() {
    let samples = [
        ("<THINK>plan</THINK>Final answer: I (think) so.", "I (think) so."),
        ("<THINK>plan</THINK>Final answer: I [think] so.", "I [think] so."),
        (
            "<THINK>plan</THINK>Final answer: usage: git [command] [args]",
            "usage: git [command] [args]",
        ),
    ];
    for (text, reply) in samples {
        match validator().validate(text) {
            ValidationResult::ThoughtAndReply { thought, reply: got } => {
                assert_eq!(thought, "plan", "{text}");
                assert_eq!(got, reply, "{text}");
            }
            other => panic!("{text}: {other:?}"),
        }
    }
}
