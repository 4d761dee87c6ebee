use prosetree::builder::*;
use prosetree::collab::{Collab, Sendable};
use prosetree::versions::{merge_change_sets, rebase_changes, Change, VersionStore, ROOT_VERSION};
use prosetree::{Fragment, Slice, Step, Transform};

fn insert(at: Pos, text: &str) -> Step {
    Step::Replace {
        from: at.clone(),
        to: at,
        slice: Slice::new(Fragment::inline(vec![txt(text)]), 0, 0),
        structure: false,
    }
}

/// A central server: a linear step log. Clients may only append when they are
/// caught up.
struct Authority {
    doc: Node,
    log: Vec<Step>,
}

impl Authority {
    fn new(doc: Node) -> Authority {
        Authority { doc, log: Vec::new() }
    }

    fn version(&self) -> u64 {
        self.log.len() as u64
    }

    fn push(&mut self, sendable: &Sendable) -> bool {
        if sendable.version != self.version() {
            return false;
        }
        for step in &sendable.steps {
            let result = step.apply(&self.doc).expect("up-to-date steps must apply");
            self.doc = result.doc;
        }
        self.log.extend(sendable.steps.iter().cloned());
        true
    }
}

fn pull(client: &mut Collab, authority: &Authority) {
    let have = client.version() as usize;
    if have < authority.log.len() {
        client.receive(&authority.log[have..]);
    }
}

fn try_push(client: &mut Collab, authority: &mut Authority) {
    if let Some(sendable) = client.sendable_steps() {
        if authority.push(&sendable) {
            client.confirm_steps(&sendable);
        }
    }
}

fn settle(clients: &mut [&mut Collab], authority: &mut Authority) {
    loop {
        let mut busy = false;
        for client in clients.iter_mut() {
            pull(client, authority);
            if client.has_unconfirmed() {
                try_push(client, authority);
                busy = true;
            }
        }
        if !busy && clients.iter().all(|c| c.version() == authority.version()) {
            break;
        }
    }
}

fn edit(client: &mut Collab, step: Step) {
    let mut tr = Transform::new(client.doc().clone());
    tr.step(step).unwrap();
    client.apply_transform(&tr);
}

#[test]
fn concurrent_inserts_converge() {
    let base = doc(vec![p("hello")]);
    let mut authority = Authority::new(base.clone());
    let mut alice = Collab::new(base.clone());
    let mut bob = Collab::new(base);

    // Both edit before either hears about the other.
    edit(&mut alice, insert(pos(&[0], 5), "A"));
    edit(&mut bob, insert(pos(&[0], 0), "B"));

    // Alice reaches the server first; Bob's push is rejected and he rebases.
    try_push(&mut alice, &mut authority);
    settle(&mut [&mut alice, &mut bob], &mut authority);

    let expected = doc(vec![p("BhelloA")]);
    assert_eq!(alice.doc(), &expected);
    assert_eq!(bob.doc(), &expected);
    assert_eq!(authority.doc, expected);
    assert_eq!(alice.version(), bob.version());
}

#[test]
fn remote_deletion_drops_local_step() {
    let base = doc(vec![p("one"), p("two")]);
    let mut authority = Authority::new(base.clone());
    let mut alice = Collab::new(base.clone());
    let mut bob = Collab::new(base);

    // Bob edits inside the paragraph Alice deletes.
    edit(&mut bob, insert(pos(&[1], 1), "x"));
    edit(&mut alice, {
        Step::Replace {
            from: pos(&[], 1),
            to: pos(&[], 2),
            slice: Slice::empty(),
            structure: false,
        }
    });

    try_push(&mut alice, &mut authority);
    settle(&mut [&mut alice, &mut bob], &mut authority);

    // Bob's insertion vanished with the paragraph.
    let expected = doc(vec![p("one")]);
    assert_eq!(bob.doc(), &expected);
    assert_eq!(authority.doc, expected);
    assert!(!bob.has_unconfirmed());
}

#[test]
fn unconfirmed_steps_resend_rebased() {
    let base = doc(vec![p("abc")]);
    let mut authority = Authority::new(base.clone());
    let mut alice = Collab::new(base.clone());
    let mut bob = Collab::new(base);

    edit(&mut bob, insert(pos(&[0], 3), "!"));
    edit(&mut alice, insert(pos(&[0], 0), ">> "));
    try_push(&mut alice, &mut authority);

    // Bob pulls Alice's step; his unconfirmed step now points past her prefix.
    pull(&mut bob, &authority);
    let resent = bob.sendable_steps().unwrap();
    assert_eq!(resent.version, 1);
    match &resent.steps[0] {
        Step::Replace { from, .. } => assert_eq!(from, &pos(&[0], 6)),
        other => panic!("unexpected step {:?}", other),
    }

    try_push(&mut bob, &mut authority);
    assert_eq!(authority.doc, doc(vec![p(">> abc!")]));
    assert_eq!(bob.doc(), &authority.doc);
}

#[test]
fn version_store_peers_converge() {
    let base = doc(vec![p("base")]);
    let mut left = VersionStore::new(base.clone());
    let mut right = VersionStore::new(base);

    // Each peer records a local chain of changes.
    let left_changes = vec![
        Change { id: 0x10, base: ROOT_VERSION, client: 1, step: insert(pos(&[0], 4), "L") },
        Change { id: 0x20, base: 0x10, client: 1, step: insert(pos(&[0], 5), "l") },
    ];
    let right_changes = vec![
        Change { id: 0x40, base: ROOT_VERSION, client: 2, step: insert(pos(&[0], 0), "R") },
    ];
    for ch in &left_changes {
        left.apply_change(ch.clone()).unwrap();
    }
    for ch in &right_changes {
        right.apply_change(ch.clone()).unwrap();
    }

    // Exchange histories; both replay the same deterministic merge.
    let merged_on_left = merge_change_sets(left_changes.clone(), right_changes.clone());
    let merged_on_right = merge_change_sets(right_changes, left_changes);
    assert_eq!(merged_on_left, merged_on_right);

    let left_tip = rebase_changes(&mut left, ROOT_VERSION, merged_on_left);
    let right_tip = rebase_changes(&mut right, ROOT_VERSION, merged_on_right);

    assert_eq!(left_tip, right_tip);
    assert_eq!(left_tip, 0x10 ^ 0x20 ^ 0x40);
    assert_eq!(left.doc(left_tip), right.doc(right_tip));
    assert_eq!(left.doc(left_tip), &doc(vec![p("RbaseLl")]));
}
