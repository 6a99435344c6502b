//! Inline validation tests

mod common;

use common::{edit, test_model};
use vtl_preview::diagnostics::{DiagnosticSource, Severity};
use vtl_preview::model::{BufferKind, EditDelta};
use vtl_preview::validation::{validate, validate_data, validate_template};

// ========================================================================
// Data
// ========================================================================

#[test]
fn test_malformed_json_yields_one_positioned_error() {
    let diagnostics = validate_data("{not json");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line, 1);
    assert_eq!(diagnostics[0].column, 1);
    assert_eq!(diagnostics[0].severity, Severity::Error);
}

#[test]
fn test_empty_object_is_valid() {
    assert!(validate_data("{}").is_empty());
    assert!(validate_data("").is_empty());
}

#[test]
fn test_top_level_array_is_rejected() {
    let diagnostics = validate_data("\n  [1, 2]");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 2));
}

// ========================================================================
// Template
// ========================================================================

#[test]
fn test_balanced_directives_are_clean() {
    let template = "\
#macro(row $cell)<td>$cell</td>#end
#define($title)Report#end
<table>
#foreach($r in $rows)
  #if($r.visible)
    #row($r.name)
  #elseif($r.hidden)
    ## skipped
  #else
    #set($count = $count + 1)
  #end
#end
</table>";
    assert_eq!(validate_template(template), vec![]);
}

#[test]
fn test_one_extra_end_yields_one_error_at_its_line() {
    let template = "#if($a)\nyes\n#end\nafter\n#end\n";
    let diagnostics = validate_template(template);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line, 5);
    assert_eq!(diagnostics[0].source, DiagnosticSource::Template);
    assert!(diagnostics[0].is_error());
}

#[test]
fn test_calls_spanning_lines_inside_directive_args_are_valid() {
    let template = "#if($s.contains(\"a\",\n  ))\nyes\n#end\n#set($x = $m.get(\n 'k'))";
    assert_eq!(validate_template(template), vec![]);
}

#[test]
fn test_call_left_open_at_end_of_document_is_reported_once() {
    let diagnostics = validate_template("ok\n#set($x = $m.get(\n 'k'");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line, 2);
    assert!(diagnostics[0].message.contains("#set"));
}

#[test]
fn test_validate_dispatches_on_buffer_kind() {
    assert_eq!(validate(BufferKind::Template, "#end").len(), 1);
    assert_eq!(validate(BufferKind::Data, "#end").len(), 1);
    assert_eq!(
        validate(BufferKind::Data, "#end")[0].source,
        DiagnosticSource::Data
    );
}

#[test]
fn test_diagnostics_are_sorted_by_position() {
    let diagnostics = validate_template("#if($a)\n${broken\n#end\n#end");
    let lines: Vec<usize> = diagnostics.iter().map(|d| d.line).collect();
    let mut sorted = lines.clone();
    sorted.sort_unstable();
    assert_eq!(lines, sorted);
    assert!(diagnostics.len() >= 2);
}

// ========================================================================
// Through the update loop
// ========================================================================

#[test]
fn test_fixing_an_error_clears_diagnostics() {
    let mut model = test_model("#foreach($i in $list)\n$i\n", "{\"list\": [1],}");
    assert_eq!(model.template.diagnostics.len(), 1);
    assert_eq!(model.data.diagnostics.len(), 1);

    let end = model.template.document.len_chars();
    edit(&mut model, BufferKind::Template, EditDelta::insert(end, "#end"));
    assert!(model.template.diagnostics.is_empty());

    let comma = model.data.document.text().rfind(',').unwrap();
    edit(&mut model, BufferKind::Data, EditDelta::delete(comma, 1));
    assert!(model.data.diagnostics.is_empty());
}
