//! Integration tests for the blockflow layout pipeline.
//!
//! These tests exercise the full path from a document to positioned
//! fragments. They verify:
//! - JSON input parses and bad input fails with a useful error
//! - Greedy line breaking never splits words
//! - Soft hyphens and text-overflow ellipses show up in the runs
//! - Floats narrow lines and nothing overlaps them
//! - Margins collapse between siblings
//! - Lines and blocks move across region boundaries, honoring widows and
//!   orphans
//! - Layout is deterministic

use blockflow::error::FlowError;
use blockflow::geometry::{Rect, Size};
use blockflow::layout::floats::{FloatManager, FloatSide};
use blockflow::layout::{LayoutEngine, LayoutResult, RunKind};
use blockflow::model::tree::{BoxId, BoxTree};
use blockflow::model::*;
use blockflow::style::*;

// ─── Helpers ────────────────────────────────────────────────────

fn config(width: f64, regions: Option<Vec<f64>>) -> LayoutConfig {
    LayoutConfig {
        container_width: width,
        fragmentation: regions.map(|heights| RegionConfig {
            heights,
            repeat_last: true,
        }),
        measurer: MeasurerConfig {
            advance: 10.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn run(root: Node, config: LayoutConfig) -> LayoutResult {
    blockflow::layout_document(&Document { config, root }).unwrap()
}

fn text_style() -> Style {
    Style {
        line_height: Some(LineHeight::Length(10.0)),
        ..Default::default()
    }
}

fn paragraph(style: Style, content: &str) -> Node {
    Node::block(style, vec![Node::text(content)])
}

fn fixed_float(side: Float, width: f64, height: f64) -> Node {
    Node::block(
        Style {
            float: Some(side),
            width: Some(Dimension::Pt(width)),
            height: Some(Dimension::Pt(height)),
            ..Default::default()
        },
        vec![],
    )
    .with_id("float")
}

// ─── Line breaking ──────────────────────────────────────────────

#[test]
fn short_text_fits_on_one_line() {
    let result = run(paragraph(text_style(), "aaaa bbbb cccc"), config(300.0, None));
    assert_eq!(result.root.lines.len(), 1);
    assert_eq!(result.root.lines[0].text(), "aaaa bbbb cccc");
    assert_eq!(result.height, 10.0);
}

#[test]
fn greedy_breaking_never_splits_words() {
    let content = "aaaa bbbb cccc dddd eeee ffff gggg";
    let result = run(paragraph(text_style(), content), config(300.0, None));
    let lines: Vec<String> = result.root.lines.iter().map(|l| l.text()).collect();
    assert_eq!(lines, vec!["aaaa bbbb cccc dddd eeee ffff ", "gggg"]);
    assert_eq!(lines.concat(), content);
    for line in &result.root.lines {
        let width: f64 = line
            .runs
            .iter()
            .filter(|r| r.kind != RunKind::TrailingSpace)
            .map(|r| r.rect.width)
            .sum();
        assert!(width <= 300.0);
    }
}

#[test]
fn soft_hyphen_breaks_with_a_visible_hyphen() {
    let result = run(paragraph(text_style(), "aaaa bbb\u{AD}cccc"), config(90.0, None));
    let lines: Vec<String> = result.root.lines.iter().map(|l| l.text()).collect();
    assert_eq!(lines, vec!["aaaa bbb-", "cccc"]);
    let hyphen = result.root.lines[0].runs.last().unwrap();
    assert_eq!(hyphen.kind, RunKind::Hyphen);
    assert!(hyphen.rect.right() <= 90.0);
}

#[test]
fn clipped_paragraph_from_json_style_gets_an_ellipsis() {
    let style: Style = serde_json::from_str(
        r#"{
            "overflow": "Hidden",
            "textOverflow": "Ellipsis",
            "whiteSpace": "Nowrap",
            "lineHeight": { "Length": 10 }
        }"#,
    )
    .unwrap();
    let result = run(paragraph(style, "aaaa bbbb cccc"), config(80.0, None));
    let line = &result.root.lines[0];
    assert_eq!(line.text(), "aaaa bb\u{2026}");
    assert_eq!(line.runs.last().unwrap().kind, RunKind::Ellipsis);
    assert!(line.runs.iter().all(|r| r.rect.right() <= 80.0));
}

#[test]
fn justified_line_fills_the_width() {
    let style = Style {
        text_align: Some(TextAlign::Justify),
        ..text_style()
    };
    let result = run(paragraph(style, "aaaa bbbb cccc dd eeeeeeeeee"), config(200.0, None));
    let first = &result.root.lines[0];
    let width: f64 = first
        .runs
        .iter()
        .filter(|r| r.kind != RunKind::TrailingSpace)
        .map(|r| r.rect.width)
        .sum();
    let expansion: f64 = first.runs.iter().map(|r| r.expansion).sum();
    assert!((width - 200.0).abs() < 1e-9);
    assert!((expansion - 30.0).abs() < 1e-9);
    // The last line is not justified.
    let last = result.root.lines.last().unwrap();
    assert!(last.runs.iter().all(|r| r.expansion == 0.0));
}

#[test]
fn right_to_left_paragraph_is_right_aligned() {
    let style = Style {
        direction: Some(Direction::Rtl),
        ..text_style()
    };
    let result = run(paragraph(style, "abc def"), config(300.0, None));
    let line = &result.root.lines[0];
    let right = line
        .runs
        .iter()
        .filter(|r| r.kind != RunKind::TrailingSpace)
        .map(|r| r.rect.right())
        .fold(f64::MIN, f64::max);
    assert!((right - 300.0).abs() < 1e-9);
}

// ─── Floats ─────────────────────────────────────────────────────

#[test]
fn left_float_narrows_available_width() {
    let mut floats = FloatManager::new(0.0, 300.0);
    floats.insert(BoxId(1), FloatSide::Left, Size::new(50.0, 40.0), 0.0, Clear::None);
    assert_eq!(floats.available_width(0.0, 40.0), 250.0);
    assert_eq!(floats.available_width(100.0, 40.0), 300.0);
}

#[test]
fn lines_never_overlap_floats() {
    let root = Node::block(
        text_style(),
        vec![
            fixed_float(Float::Left, 50.0, 25.0),
            Node::text("aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii jjjj"),
        ],
    );
    let result = run(root, config(150.0, None));
    let float = result.root.find_named("float").unwrap();
    let float_rect = float.rect;
    let lines = result.absolute_lines();
    assert!(lines.len() > 3);
    for line in &lines {
        for r in line.runs.iter().filter(|r| r.kind != RunKind::TrailingSpace) {
            assert!(!r.rect.intersects(&float_rect), "{:?} overlaps the float", r);
        }
    }
    // Lines beside the float start after it; lines below it don't.
    assert_eq!(lines[0].rect.x, 50.0);
    assert_eq!(lines[3].rect.x, 0.0);
}

#[test]
fn right_float_sits_at_the_right_edge() {
    let root = Node::block(
        text_style(),
        vec![fixed_float(Float::Right, 60.0, 20.0), Node::text("aaaa")],
    );
    let result = run(root, config(300.0, None));
    let float = result.root.find_named("float").unwrap();
    assert_eq!(float.rect, Rect::new(240.0, 0.0, 60.0, 20.0));
    assert_eq!(result.root.lines[0].available_width, 240.0);
}

// ─── Block stacking ─────────────────────────────────────────────

#[test]
fn margins_collapse_between_siblings_from_json() {
    let json = r#"{
        "config": { "containerWidth": 300 },
        "root": {
            "kind": { "type": "Block" },
            "children": [
                {
                    "kind": { "type": "Block" }, "id": "a",
                    "style": {
                        "height": { "Pt": 10 },
                        "margin": { "top": { "Pt": 0 }, "right": { "Pt": 0 }, "bottom": { "Pt": 20 }, "left": { "Pt": 0 } }
                    }
                },
                {
                    "kind": { "type": "Block" }, "id": "b",
                    "style": {
                        "height": { "Pt": 10 },
                        "margin": { "top": { "Pt": 10 }, "right": { "Pt": 0 }, "bottom": { "Pt": 0 }, "left": { "Pt": 0 } }
                    }
                }
            ]
        }
    }"#;
    let result = blockflow::layout_json(json).unwrap();
    let a = result.root.find_named("a").unwrap();
    let b = result.root.find_named("b").unwrap();
    assert_eq!(b.rect.y - a.rect.bottom(), 20.0);
}

#[test]
fn centered_block_with_auto_margins() {
    let root = Node::block(
        Style::default(),
        vec![Node::block(
            Style {
                width: Some(Dimension::Pt(100.0)),
                height: Some(Dimension::Pt(10.0)),
                margin: Some(EdgeValues {
                    top: Dimension::Pt(0.0),
                    right: Dimension::Auto,
                    bottom: Dimension::Pt(0.0),
                    left: Dimension::Auto,
                }),
                ..Default::default()
            },
            vec![],
        )
        .with_id("centered")],
    );
    let result = run(root, config(300.0, None));
    assert_eq!(result.root.find_named("centered").unwrap().rect.x, 100.0);
}

#[test]
fn block_inside_inline_splits_the_inline() {
    let root = Node::block(
        text_style(),
        vec![Node::inline(
            Style::default(),
            vec![
                Node::text("before"),
                Node::block(Style::default(), vec![Node::text("middle")]),
                Node::text("after"),
            ],
        )],
    );
    let result = run(root, config(300.0, None));
    // Anonymous block, the block itself, anonymous block.
    assert_eq!(result.root.children.len(), 3);
    let texts: Vec<String> = result.absolute_lines().iter().map(|l| {
        let mut runs = l.runs.clone();
        runs.sort_by_key(|r| r.start);
        runs.iter().map(|r| r.text.clone()).collect::<String>()
    }).collect();
    assert_eq!(texts, vec!["before", "middle", "after"]);
    assert_eq!(result.height, 30.0);
}

// ─── Fragmentation ──────────────────────────────────────────────

#[test]
fn line_crossing_a_boundary_moves_to_the_next_region() {
    let style = Style {
        orphans: Some(1),
        widows: Some(1),
        ..text_style()
    };
    let result = run(paragraph(style, "aaaa bbbb cccc dddd"), config(40.0, Some(vec![25.0])));
    let tops: Vec<f64> = result.root.lines.iter().map(|l| l.top).collect();
    assert_eq!(tops, vec![0.0, 10.0, 25.0, 35.0]);
    let third = &result.root.lines[2];
    assert_eq!(third.pagination_strut, 5.0);
    assert!(third.is_first_after_break);
    assert_eq!(result.regions.len(), 2);
}

#[test]
fn widows_pull_a_line_into_the_next_region() {
    let style = Style {
        orphans: Some(2),
        widows: Some(2),
        ..text_style()
    };
    let result = run(paragraph(style, "aaaa bbbb cccc dddd"), config(40.0, Some(vec![35.0])));
    let tops: Vec<f64> = result.root.lines.iter().map(|l| l.top).collect();
    // Without widow control only the last line would move.
    assert_eq!(tops, vec![0.0, 10.0, 35.0, 45.0]);
}

#[test]
fn widow_fix_never_creates_orphans() {
    let style = Style {
        orphans: Some(3),
        widows: Some(2),
        ..text_style()
    };
    let result = run(paragraph(style, "aaaa bbbb cccc dddd"), config(40.0, Some(vec![35.0])));
    let tops: Vec<f64> = result.root.lines.iter().map(|l| l.top).collect();
    assert_eq!(tops, vec![0.0, 10.0, 20.0, 35.0]);
}

#[test]
fn orphans_push_the_whole_paragraph() {
    let style = Style {
        orphans: Some(2),
        widows: Some(1),
        ..text_style()
    };
    let root = Node::block(
        Style::default(),
        vec![
            Node::block(
                Style {
                    height: Some(Dimension::Pt(8.0)),
                    ..Default::default()
                },
                vec![],
            ),
            paragraph(style, "aaaa bbbb cccc").with_id("p"),
        ],
    );
    let result = run(root, config(40.0, Some(vec![25.0])));
    let p = result.root.find_named("p").unwrap();
    assert_eq!(p.rect.y, 25.0);
    assert_eq!(p.pagination_strut, 17.0);
    assert_eq!(p.lines[0].top, 0.0);
}

// ─── Determinism and errors ─────────────────────────────────────

#[test]
fn layout_is_deterministic() {
    let root = Node::block(
        text_style(),
        vec![
            fixed_float(Float::Left, 50.0, 25.0),
            Node::text("aaaa bbbb cccc dddd eeee ffff gggg"),
        ],
    );
    let tree = BoxTree::build(&root).unwrap();
    let config = config(150.0, Some(vec![40.0]));
    let first = LayoutEngine::from_config(&config).layout(&tree, &config);
    let second = LayoutEngine::from_config(&config).layout(&tree, &config);
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[test]
fn malformed_json_reports_a_hint() {
    let err = blockflow::layout_json("{ \"root\": ").unwrap_err();
    assert!(matches!(err, FlowError::Parse { .. }));
    assert!(err.to_string().contains("Hint"));
}

#[test]
fn text_with_children_is_rejected() {
    let json = r#"{
        "root": {
            "kind": { "type": "Block" },
            "children": [
                { "kind": { "type": "Text", "content": "x" }, "children": [ { "kind": { "type": "Block" } } ] }
            ]
        }
    }"#;
    let err = blockflow::layout_json(json).unwrap_err();
    assert!(matches!(err, FlowError::InvalidTree(_)));
}

#[test]
fn result_serializes_in_camel_case() {
    let result = run(paragraph(text_style(), "hi"), config(100.0, None));
    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"boxId\""));
    assert!(json.contains("\"paginationStrut\""));
    assert!(json.contains("\"repaint\""));
}
