use kvs_cache::recorder::{inputs_key, outputs_key, FnOperation, Operation, OperationExt};
use kvs_cache::{replay, KvStore, KvsEngine, KvsError, MemoryEngine, Result, Value};
use tempfile::TempDir;

/// Maps "a" to "1", "b" to "2" and so on; fails on anything else.
fn ordinal(op: &str) -> FnOperation<impl Fn((String,)) -> Result<String>, (String,), String> {
    FnOperation::named(op, |(letter,): (String,)| match letter.as_bytes() {
        [b @ b'a'..=b'z'] => Ok((b - b'a' + 1).to_string()),
        _ => Err(KvsError::StringError(format!("not a letter: {}", letter))),
    })
}

fn state<E: KvsEngine>(engine: &E, name: &str) -> Result<(Option<Value>, Vec<Value>, Vec<Value>)> {
    Ok((
        engine.get(name.to_owned())?,
        engine.lrange(inputs_key(name), 0, -1)?,
        engine.lrange(outputs_key(name), 0, -1)?,
    ))
}

#[test]
fn never_called_is_empty() -> Result<()> {
    let engine = MemoryEngine::new();
    let (count, inputs, outputs) = state(&engine, "unused")?;
    assert_eq!(count, None);
    assert!(inputs.is_empty());
    assert!(outputs.is_empty());
    assert_eq!(replay(&engine, "unused")?.count, 0);
    Ok(())
}

#[test]
fn n_calls_are_logged_in_order() -> Result<()> {
    let temp_dir = TempDir::new().expect("unable to create temporary working directory");
    let engine = KvStore::open(temp_dir.path())?;
    let op = ordinal("ordinal")
        .call_history(engine.clone())
        .count_calls(engine.clone());

    let letters = ["a", "b", "c", "d", "e"];
    for letter in letters.iter() {
        op.call((letter.to_string(),))?;
    }

    let (count, inputs, outputs) = state(&engine, "ordinal")?;
    assert_eq!(count, Some(Value::Int(letters.len() as i64)));
    let expected_inputs: Vec<Value> = letters
        .iter()
        .map(|l| Value::from(format!("[\"{}\"]", l)))
        .collect();
    let expected_outputs: Vec<Value> = (1..=letters.len())
        .map(|i| Value::from(format!("\"{}\"", i)))
        .collect();
    assert_eq!(inputs, expected_inputs);
    assert_eq!(outputs, expected_outputs);
    Ok(())
}

#[test]
fn composition_order_does_not_matter() -> Result<()> {
    let count_outer = MemoryEngine::new();
    let history_outer = MemoryEngine::new();
    let a = ordinal("op")
        .call_history(count_outer.clone())
        .count_calls(count_outer.clone());
    let b = ordinal("op")
        .count_calls(history_outer.clone())
        .call_history(history_outer.clone());

    for letter in &["x", "y", "7", "z"] {
        let ra = a.call((letter.to_string(),));
        let rb = b.call((letter.to_string(),));
        assert_eq!(ra.is_ok(), rb.is_ok());
    }

    assert_eq!(state(&count_outer, "op")?, state(&history_outer, "op")?);
    let (count, inputs, outputs) = state(&count_outer, "op")?;
    assert_eq!(count, Some(Value::Int(3)));
    assert_eq!(inputs.len(), 4);
    assert_eq!(outputs.len(), 3);
    Ok(())
}

#[test]
fn result_is_returned_unchanged() -> Result<()> {
    let engine = MemoryEngine::new();
    let op = ordinal("op").call_history(engine.clone()).count_calls(engine);
    assert_eq!(op.call(("c".to_owned(),))?, "3");
    Ok(())
}

#[test]
fn replay_three_calls() -> Result<()> {
    let engine = MemoryEngine::new();
    let op = ordinal("op").call_history(engine.clone()).count_calls(engine.clone());
    for letter in &["a", "b", "c"] {
        op.call((letter.to_string(),))?;
    }

    let trace = replay(&engine, "op")?;
    assert_eq!(
        trace.lines(),
        vec![
            "op was called 3 times:",
            "op(*[\"a\"]) -> 1",
            "op(*[\"b\"]) -> 2",
            "op(*[\"c\"]) -> 3",
        ]
    );
    Ok(())
}

#[test]
fn replay_tolerates_missing_outputs() -> Result<()> {
    let engine = MemoryEngine::new();
    let op = ordinal("op").call_history(engine.clone()).count_calls(engine.clone());
    op.call(("a".to_owned(),))?;
    assert!(op.call(("!".to_owned(),)).is_err());
    op.call(("b".to_owned(),))?;
    // a crash between the two log writes
    engine.rpush(inputs_key("op"), Value::from("[\"c\"]"))?;

    let trace = replay(&engine, "op")?;
    assert_eq!(trace.count, 2);
    assert_eq!(trace.calls.len(), 2);
    assert_eq!(trace.lines().len(), 3);
    // pairing is positional, so the failed call shifts what follows
    assert_eq!(trace.calls[1].inputs, "[\"!\"]");
    assert_eq!(trace.calls[1].output, "\"2\"");
    Ok(())
}
