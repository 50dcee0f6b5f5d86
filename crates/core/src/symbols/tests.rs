use super::*;

fn token(text: &str, line: usize, column: usize) -> Token {
    Token::new(SourceId(0), line, column, 0, text)
}

fn table_with_file() -> (SymbolTable, ScopeId) {
    let mut table = SymbolTable::new();
    let file = table.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(0));
    (table, file)
}

#[test]
fn classifies_names() {
    assert_eq!(classify_name("start"), Some(LabelScope::Global));
    assert_eq!(classify_name("player.x"), Some(LabelScope::Global));
    assert_eq!(classify_name(".loop"), Some(LabelScope::Local));
    assert_eq!(classify_name("++"), Some(LabelScope::Nameless));
    assert_eq!(classify_name("---"), Some(LabelScope::Nameless));
    assert_eq!(classify_name("+-"), None);
    assert_eq!(classify_name("1abc"), None);
    assert_eq!(classify_name("a..b"), None);
    assert_eq!(classify_name("."), None);
    assert_eq!(classify_name("trailing."), None);
}

#[test]
fn create_then_find_returns_the_same_label() {
    let (mut table, file) = table_with_file();
    let id = table
        .create_label(&token("start", 1, 0), file, LabelKind::Label, false)
        .expect("create");
    assert_eq!(table.find_label("start", file), Some(id));
    assert_eq!(table.label(id).scope_id, ScopeId::GLOBAL);

    let duplicate = table
        .create_label(&token("start", 9, 0), file, LabelKind::Label, false)
        .expect_err("duplicate");
    assert!(matches!(
        duplicate,
        SymbolError::Duplicate { ref name, ref previous } if name == "start" && previous.line == 1
    ));
}

#[test]
fn local_labels_are_per_file() {
    let mut table = SymbolTable::new();
    let first = table.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(0));
    let second = table.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(1));
    let a = table
        .create_label(&token(".loop", 1, 0), first, LabelKind::Label, false)
        .expect("first");
    let b = table
        .create_label(&token(".loop", 1, 0), second, LabelKind::Label, false)
        .expect("second");
    assert_ne!(a, b);
    assert_eq!(table.find_label(".loop", first), Some(a));
    assert_eq!(table.find_label(".loop", second), Some(b));
}

#[test]
fn expansion_scopes_shadow_and_do_not_leak() {
    let (mut table, file) = table_with_file();
    let global = table
        .create_label(&token("value", 1, 0), file, LabelKind::Defined, false)
        .expect("global");
    let expansion = table.add_scope(ScopeKind::Macro, file, SourceId(0));
    let param = table
        .create_label(&token("value", 5, 0), expansion, LabelKind::Parameter, false)
        .expect("parameter");
    let inner = table
        .create_label(&token("inner", 6, 0), expansion, LabelKind::Label, false)
        .expect("inner");

    assert_eq!(table.find_label("value", expansion), Some(param));
    assert_eq!(table.find_label("value", file), Some(global));
    assert_eq!(table.find_label("inner", expansion), Some(inner));
    assert_eq!(table.find_label("inner", file), None);
    let public: Vec<&str> = table
        .public_labels()
        .iter()
        .map(|label| label.name.as_str())
        .collect();
    assert_eq!(public, vec!["value"]);
}

#[test]
fn nameless_labels_resolve_by_position() {
    let (mut table, file) = table_with_file();
    let first = table
        .create_label(&token("+", 1, 0), file, LabelKind::Label, true)
        .expect("first");
    let second = table
        .create_label(&token("+", 5, 0), file, LabelKind::Label, true)
        .expect("second");
    let third = table
        .create_label(&token("+", 9, 0), file, LabelKind::Label, true)
        .expect("third");

    // A `++` written on line 3 skips the label on line 5.
    assert_eq!(
        table.find_nameless(&LabelRef::Forward(2), file, 3, 4),
        Some(third)
    );
    assert_eq!(
        table.find_nameless(&LabelRef::Forward(1), file, 3, 4),
        Some(second)
    );
    // A reference on the label's own line looks strictly past it.
    assert_eq!(
        table.find_nameless(&LabelRef::Forward(1), file, 5, 4),
        Some(third)
    );
    assert_eq!(
        table.find_nameless(&LabelRef::Backward(1), file, 5, 4),
        Some(second)
    );
    assert_eq!(
        table.find_nameless(&LabelRef::Backward(2), file, 5, 4),
        Some(first)
    );
    assert_eq!(table.find_nameless(&LabelRef::Backward(1), file, 1, 0), None);
    assert_eq!(table.find_nameless(&LabelRef::Forward(1), file, 9, 2), None);
}

#[test]
fn nameless_labels_need_permission() {
    let (mut table, file) = table_with_file();
    assert!(matches!(
        table.create_label(&token("-", 1, 0), file, LabelKind::Defined, false),
        Err(SymbolError::NamelessNotAllowed { .. })
    ));
}

#[test]
fn unbind_and_rebind_keep_the_same_label() {
    let (mut table, file) = table_with_file();
    let id = table
        .create_label(&token("flag", 1, 0), file, LabelKind::Defined, false)
        .expect("create");
    table.set_value(id, Some(Value::int(3)));
    table.unbind(id);
    table.unbind(id);
    assert_eq!(table.find_label("flag", file), None);
    assert!(!table.tree().contains("flag"));

    table.rebind(id).expect("rebind");
    assert_eq!(table.find_label("flag", file), Some(id));
    assert_eq!(table.label(id).int_value(), Some(3));

    table.unbind(id);
    let other = table
        .create_label(&token("flag", 7, 0), file, LabelKind::Defined, false)
        .expect("replacement");
    assert!(matches!(
        table.rebind(id),
        Err(SymbolError::Duplicate { .. })
    ));
    assert_eq!(table.find_label("flag", file), Some(other));
}

#[test]
fn set_value_reports_changes() {
    let (mut table, file) = table_with_file();
    let id = table
        .create_label(&token("x", 1, 0), file, LabelKind::Label, false)
        .expect("create");
    assert!(table.set_value(id, Some(Value::int(1))));
    assert!(!table.set_value(id, Some(Value::int(1))));
    assert!(table.set_value(id, None));
}

#[test]
fn clearing_a_file_removes_its_symbols_and_prunes_the_tree() {
    let mut table = SymbolTable::new();
    let main = table.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(0));
    let lib = table.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(1));
    let lib_token = |text: &str, line| Token::new(SourceId(1), line, 0, 0, text);

    table
        .create_label(&lib_token("sprite.x", 1), lib, LabelKind::Defined, false)
        .expect("sprite.x");
    table
        .create_label(&lib_token(".tmp", 2), lib, LabelKind::Label, false)
        .expect(".tmp");
    table
        .create_label(&lib_token("-", 3), lib, LabelKind::Label, true)
        .expect("nameless");
    table
        .define_macro(Macro {
            name: "wait".to_string(),
            parameters: Vec::new(),
            body: Vec::new(),
            source_id: SourceId(1),
            token: lib_token("wait", 4),
        })
        .expect("macro");
    table.add_reference(SourceId(0), "sprite");

    table.clear_file(SourceId(1));
    assert_eq!(table.find_label("sprite.x", main), None);
    assert_eq!(table.find_label(".tmp", lib), None);
    assert_eq!(table.find_nameless(&LabelRef::Backward(1), lib, 9, 0), None);
    assert!(table.macro_named("wait").is_none());
    assert!(table.tree().is_placeholder("sprite"));
    assert!(table.tree().children("sprite").is_empty());

    table.clear_file(SourceId(0));
    assert!(!table.tree().contains("sprite"));
}

#[test]
fn released_files_hand_their_slots_back() {
    let mut table = SymbolTable::new();
    let main = table.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(0));
    let lib = table.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(1));
    let expansion = table.add_scope(ScopeKind::Macro, lib, SourceId(1));
    let lib_token = |text: &str, line| Token::new(SourceId(1), line, 0, 0, text);
    let kept = table
        .create_label(&token("start", 1, 0), main, LabelKind::Label, false)
        .expect("start");
    table
        .create_label(&lib_token("shared", 1), lib, LabelKind::Label, false)
        .expect("shared");
    table
        .create_label(&lib_token("n", 2), expansion, LabelKind::Parameter, false)
        .expect("n");
    let before = table.slot_counts();

    table.release_file(SourceId(1));
    table.release_file(SourceId(1));
    assert_eq!(table.find_label("shared", main), None);
    assert_eq!(table.label(kept).name, "start");

    assert_eq!(table.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(1)), lib);
    assert_eq!(table.add_scope(ScopeKind::Macro, lib, SourceId(1)), expansion);
    let shared = table
        .create_label(&lib_token("shared", 1), lib, LabelKind::Label, false)
        .expect("shared again");
    table
        .create_label(&lib_token("n", 2), expansion, LabelKind::Parameter, false)
        .expect("n again");
    assert_eq!(table.slot_counts(), before);
    assert_eq!(table.find_label("shared", main), Some(shared));
}

#[test]
fn duplicate_macros_are_rejected() {
    let mut table = SymbolTable::new();
    let definition = Macro {
        name: "push_all".to_string(),
        parameters: vec!["a".to_string()],
        body: Vec::new(),
        source_id: SourceId(0),
        token: token("push_all", 1, 7),
    };
    table.define_macro(definition.clone()).expect("first");
    assert!(matches!(
        table.define_macro(definition),
        Err(SymbolError::DuplicateMacro { .. })
    ));
}
