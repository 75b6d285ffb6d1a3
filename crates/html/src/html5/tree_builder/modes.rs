//! HTML5 insertion modes used by the tree builder state machine.

/// Tree-construction insertion mode.
///
/// Exactly one mode is current at any time. A secondary "original insertion
/// mode" register is saved/restored around `Text` parsing and `InTableText`
/// accumulation; `<template>` additionally maintains its own stack of modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InsertionMode {
    #[default]
    Initial,
    BeforeHtml,
    BeforeHead,
    InHead,
    InHeadNoscript,
    AfterHead,
    InBody,
    Text,
    InTable,
    InTableText,
    InCaption,
    InColumnGroup,
    InTableBody,
    InRow,
    InCell,
    InSelect,
    InSelectInTable,
    InTemplate,
    AfterBody,
    InFrameset,
    AfterFrameset,
    AfterAfterBody,
    AfterAfterFrameset,
}
