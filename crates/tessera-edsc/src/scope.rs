//! The node arena and its scope lifecycle.
//!
//! An [`EdscContext`] owns every node built while one of its scopes is
//! active. [`EdscContext::enter`] opens a scope and returns a [`Scope`]
//! guard; exiting the guard (explicitly or by dropping it) frees the nodes
//! and bumps the generation, so handles issued inside the scope are
//! rejected with [`EdscError::StaleHandle`] afterwards.
//!
//! Scopes do not nest: entering while a scope is active fails with
//! [`EdscError::ScopeAlreadyActive`].

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};

use cranelift_entity::{EntityRef, PrimaryMap};
use smallvec::SmallVec;

use crate::errors::{EdscError, EdscResult};
use crate::node::*;

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Default)]
struct ArenaState {
    generation: u32,
    active: bool,
    next_symbol: u32,
    exprs: PrimaryMap<ExprIdx, ExprKind>,
    stmts: PrimaryMap<StmtIdx, StmtKind>,
    blocks: PrimaryMap<BlockIdx, BlockNode>,
    attrs: PrimaryMap<AttrIdx, AttrValue>,
}

/// Arena of builder nodes.
///
/// Single-threaded: the state lives in a `RefCell`, so a context is `!Sync`.
pub struct EdscContext {
    id: u32,
    state: RefCell<ArenaState>,
}

impl EdscContext {
    pub fn new() -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            state: RefCell::new(ArenaState::default()),
        }
    }

    /// Open a scope.
    pub fn enter(&self) -> EdscResult<Scope<'_>> {
        let mut state = self.state.borrow_mut();
        if state.active {
            return Err(EdscError::ScopeAlreadyActive);
        }
        state.active = true;
        state.next_symbol = 0;
        tracing::debug!(arena = self.id, generation = state.generation, "entered scope");
        Ok(Scope { cx: self })
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Number of nodes owned by the active scope.
    pub fn node_count(&self) -> usize {
        let state = self.state.borrow();
        state.exprs.len() + state.stmts.len() + state.blocks.len() + state.attrs.len()
    }

    fn release(&self) {
        let mut state = self.state.borrow_mut();
        let freed =
            state.exprs.len() + state.stmts.len() + state.blocks.len() + state.attrs.len();
        state.exprs.clear();
        state.stmts.clear();
        state.blocks.clear();
        state.attrs.clear();
        state.generation = state.generation.wrapping_add(1);
        state.active = false;
        tracing::debug!(arena = self.id, freed, "exited scope");
    }

    fn tag(&self, state: &ArenaState) -> EdscResult<Tag> {
        if !state.active {
            return Err(EdscError::NoActiveScope);
        }
        Ok(Tag {
            arena: self.id,
            generation: state.generation,
        })
    }

    fn check(&self, state: &ArenaState, tag: Tag) -> EdscResult<()> {
        if !state.active || tag.arena != self.id || tag.generation != state.generation {
            return Err(EdscError::StaleHandle);
        }
        Ok(())
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    pub(crate) fn alloc_expr(&self, kind: ExprKind) -> EdscResult<Expr> {
        let mut state = self.state.borrow_mut();
        let tag = self.tag(&state)?;
        let idx = state.exprs.push(kind);
        Ok(Expr { tag, idx })
    }

    /// Allocate a fresh bindable of type `ty`.
    pub(crate) fn alloc_bindable(&self, ty: tessera_ir::TypeRef) -> EdscResult<Expr> {
        let mut state = self.state.borrow_mut();
        let tag = self.tag(&state)?;
        state.next_symbol += 1;
        let id = state.next_symbol;
        let idx = state.exprs.push(ExprKind::Bindable { ty, id });
        Ok(Expr { tag, idx })
    }

    pub(crate) fn alloc_stmt(&self, kind: StmtKind) -> EdscResult<Stmt> {
        let mut state = self.state.borrow_mut();
        let tag = self.tag(&state)?;
        let idx = state.stmts.push(kind);
        Ok(Stmt { tag, idx })
    }

    pub(crate) fn alloc_block(&self, node: BlockNode) -> EdscResult<Block> {
        let mut state = self.state.borrow_mut();
        let tag = self.tag(&state)?;
        let idx = state.blocks.push(node);
        Ok(Block { tag, idx })
    }

    pub(crate) fn alloc_attr(&self, value: AttrValue) -> EdscResult<Attr> {
        let mut state = self.state.borrow_mut();
        let tag = self.tag(&state)?;
        let idx = state.attrs.push(value);
        Ok(Attr { tag, idx })
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Payload of `e`.
    pub fn expr_kind(&self, e: Expr) -> EdscResult<ExprKind> {
        let state = self.state.borrow();
        self.check(&state, e.tag)?;
        state
            .exprs
            .get(e.idx)
            .cloned()
            .ok_or(EdscError::StaleHandle)
    }

    pub fn stmt_kind(&self, s: Stmt) -> EdscResult<StmtKind> {
        let state = self.state.borrow();
        self.check(&state, s.tag)?;
        state
            .stmts
            .get(s.idx)
            .cloned()
            .ok_or(EdscError::StaleHandle)
    }

    pub fn block_node(&self, b: Block) -> EdscResult<BlockNode> {
        let state = self.state.borrow();
        self.check(&state, b.tag)?;
        state
            .blocks
            .get(b.idx)
            .cloned()
            .ok_or(EdscError::StaleHandle)
    }

    pub fn attr_value(&self, a: Attr) -> EdscResult<AttrValue> {
        let state = self.state.borrow();
        self.check(&state, a.tag)?;
        state.attrs.get(a.idx).copied().ok_or(EdscError::StaleHandle)
    }

    /// Fail unless every handle in `exprs` is live.
    pub(crate) fn check_exprs(&self, exprs: &[Expr]) -> EdscResult<()> {
        let state = self.state.borrow();
        for e in exprs {
            self.check(&state, e.tag)?;
            if e.idx.index() >= state.exprs.len() {
                return Err(EdscError::StaleHandle);
            }
        }
        Ok(())
    }

    pub(crate) fn check_stmts(&self, stmts: &[Stmt]) -> EdscResult<()> {
        let state = self.state.borrow();
        for s in stmts {
            self.check(&state, s.tag)?;
            if s.idx.index() >= state.stmts.len() {
                return Err(EdscError::StaleHandle);
            }
        }
        Ok(())
    }

    pub(crate) fn check_blocks(&self, blocks: &[Block]) -> EdscResult<()> {
        let state = self.state.borrow();
        for b in blocks {
            self.check(&state, b.tag)?;
            if b.idx.index() >= state.blocks.len() {
                return Err(EdscError::StaleHandle);
            }
        }
        Ok(())
    }

    pub(crate) fn check_attrs(&self, attrs: &[Attr]) -> EdscResult<()> {
        let state = self.state.borrow();
        for a in attrs {
            self.check(&state, a.tag)?;
            if a.idx.index() >= state.attrs.len() {
                return Err(EdscError::StaleHandle);
            }
        }
        Ok(())
    }

    /// Replace the body of `b`.
    pub(crate) fn replace_block_body(&self, b: Block, body: Vec<Stmt>) -> EdscResult<()> {
        let mut state = self.state.borrow_mut();
        self.check(&state, b.tag)?;
        let node = state.blocks.get_mut(b.idx).ok_or(EdscError::StaleHandle)?;
        node.body = body;
        Ok(())
    }

    /// The bindable ids of `args`, failing on any non-bindable.
    pub(crate) fn bindable_ids(&self, args: &[Expr]) -> EdscResult<SmallVec<[u32; 4]>> {
        args.iter()
            .map(|&e| match self.expr_kind(e)? {
                ExprKind::Bindable { id, .. } => Ok(id),
                _ => Err(EdscError::NotBindable(self.render_expr(e)?)),
            })
            .collect()
    }
}

impl Default for EdscContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for an active scope. Exits the scope when dropped.
#[must_use = "dropping the scope immediately invalidates every node built in it"]
pub struct Scope<'cx> {
    cx: &'cx EdscContext,
}

impl Scope<'_> {
    /// Exit the scope, freeing every node built in it.
    pub fn exit(self) {
        drop(self)
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.cx.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ir::IrContext;

    #[test]
    fn reenter_while_active_fails() {
        let cx = EdscContext::new();
        let scope = cx.enter().unwrap();
        assert_eq!(cx.enter().err(), Some(EdscError::ScopeAlreadyActive));
        scope.exit();
        assert!(cx.enter().is_ok());
    }

    #[test]
    fn handles_are_stale_after_exit() {
        let mut ir = IrContext::new();
        let i32_ty = ir.types.int(32);
        let cx = EdscContext::new();

        let scope = cx.enter().unwrap();
        let x = cx.bindable(i32_ty).unwrap();
        assert!(cx.expr_kind(x).is_ok());
        assert_eq!(cx.node_count(), 1);
        scope.exit();

        assert_eq!(cx.node_count(), 0);
        assert_eq!(cx.expr_kind(x), Err(EdscError::StaleHandle));

        let _scope = cx.enter().unwrap();
        assert_eq!(cx.expr_kind(x), Err(EdscError::StaleHandle));
        assert_eq!(cx.negate(x), Err(EdscError::StaleHandle));
    }

    #[test]
    fn construction_needs_a_scope() {
        let mut ir = IrContext::new();
        let i32_ty = ir.types.int(32);
        let cx = EdscContext::new();
        assert_eq!(cx.bindable(i32_ty), Err(EdscError::NoActiveScope));
    }

    #[test]
    fn handles_from_another_context_are_rejected() {
        let mut ir = IrContext::new();
        let i32_ty = ir.types.int(32);
        let a = EdscContext::new();
        let b = EdscContext::new();
        let _sa = a.enter().unwrap();
        let _sb = b.enter().unwrap();
        let x = a.bindable(i32_ty).unwrap();
        assert_eq!(b.expr_kind(x), Err(EdscError::StaleHandle));
    }

    #[test]
    fn dropping_the_guard_exits() {
        let cx = EdscContext::new();
        {
            let _scope = cx.enter().unwrap();
            assert!(cx.is_active());
        }
        assert!(!cx.is_active());
    }
}
