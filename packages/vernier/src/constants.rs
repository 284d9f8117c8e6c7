// A poisoned lock means some thread panicked while rewriting shared registry or cache state.
// That state can no longer be trusted to be consistent, so we panic as well.
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - registry state \
    may be inconsistent and continued execution could export corrupted data";
