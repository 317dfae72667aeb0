//! Parsing and planning of einsum equations.
//!
//! An equation such as `"bij,bjk->bik"` is parsed into an [`Equation`], then checked against the
//! operand shapes to produce an [`EinsumPlan`]. The plan lists, for every operand, how far a step
//! along each output or contracted label moves in that operand's buffer.

use std::{collections::BTreeMap, str::FromStr};

use derive_more::Display;
use itertools::Itertools;
use thiserror::Error;

use crate::loom::layout::{Shape, offsets};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EinsumError {
    #[error("einsum requires at least one operand")]
    NoOperands,
    #[error("invalid character {0:?} in equation")]
    Char(char),
    #[error("'.' must appear as part of an ellipsis '...'")]
    Dot,
    #[error("term {0:?} contains more than one ellipsis")]
    Ellipsis(String),
    #[error("equation contains more than one '->'")]
    Arrow,
    #[error("equation has {0} input terms but {1} operands were given")]
    Operands(usize, usize),
    #[error("term {0:?} does not fit operand of shape {1}")]
    Rank(String, Shape),
    #[error("label {0} has mismatched sizes {1} and {2}")]
    Size(Label, usize, usize),
    #[error("output label {0} does not appear in any input")]
    Output(Label),
    #[error("output label {0} appears more than once")]
    Repeat(Label),
}

/// A dimension name. Ellipsis dimensions are numbered from the left of the broadcast ellipsis.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    #[display("...{_0}")]
    Ellipsis(usize),
    #[display("{_0}")]
    Named(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Named(char),
    Ellipsis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    text: String,
    tokens: Vec<Token>,
}

impl Term {
    fn parse(text: &str) -> Result<Self, EinsumError> {
        let mut tokens = vec![];
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                c if c.is_ascii_alphabetic() => tokens.push(Token::Named(c)),
                '.' => {
                    if chars.next_if_eq(&'.').is_none() || chars.next_if_eq(&'.').is_none() {
                        return Err(EinsumError::Dot);
                    }
                    tokens.push(Token::Ellipsis);
                }
                c => return Err(EinsumError::Char(c)),
            }
        }
        if tokens.iter().filter(|&&token| token == Token::Ellipsis).count() > 1 {
            return Err(EinsumError::Ellipsis(text.into()));
        }
        let text = text.into();
        Ok(Self { text, tokens })
    }

    #[inline]
    fn has_ellipsis(&self) -> bool {
        self.tokens.contains(&Token::Ellipsis)
    }

    #[inline]
    fn named_count(&self) -> usize {
        self.tokens.len() - self.has_ellipsis() as usize
    }

    /// Expands the term into one label per mode of an operand of `dim` modes,
    /// right-aligning the ellipsis into `broadcast` ellipsis labels.
    fn expand(&self, dim: usize, broadcast: usize) -> Vec<Label> {
        let span = dim.saturating_sub(self.named_count());
        self.tokens
            .iter()
            .flat_map(|token| match *token {
                Token::Named(c) => vec![Label::Named(c)],
                Token::Ellipsis => (broadcast - span..broadcast).map(Label::Ellipsis).collect(),
            })
            .collect()
    }
}

/// A parsed einsum equation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equation {
    inputs: Vec<Term>,
    output: Option<Term>,
}

impl FromStr for Equation {
    type Err = EinsumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let (inputs, output) = match s.split("->").collect_vec()[..] {
            [inputs] => (inputs, None),
            [inputs, output] => (inputs, Some(output)),
            _ => return Err(EinsumError::Arrow),
        };
        let inputs = inputs
            .split(',')
            .map(Term::parse)
            .collect::<Result<_, _>>()?;
        let output = output.map(Term::parse).transpose()?;
        Ok(Self { inputs, output })
    }
}

impl Equation {
    /// Number of input terms.
    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Checks the equation against operand shapes and computes the contraction plan.
    pub fn plan(&self, shapes: &[Shape]) -> Result<EinsumPlan, EinsumError> {
        if shapes.is_empty() {
            return Err(EinsumError::NoOperands);
        }
        if self.inputs.len() != shapes.len() {
            return Err(EinsumError::Operands(self.inputs.len(), shapes.len()));
        }

        for (term, shape) in self.inputs.iter().zip_eq(shapes) {
            let fits = match term.has_ellipsis() {
                true => shape.len() >= term.named_count(),
                false => shape.len() == term.named_count(),
            };
            if !fits {
                return Err(EinsumError::Rank(term.text.clone(), shape.clone()));
            }
        }

        let broadcast = self
            .inputs
            .iter()
            .zip_eq(shapes)
            .filter(|(term, _)| term.has_ellipsis())
            .map(|(term, shape)| shape.len() - term.named_count())
            .max()
            .unwrap_or(0);

        let labels = self
            .inputs
            .iter()
            .zip_eq(shapes)
            .map(|(term, shape)| term.expand(shape.len(), broadcast))
            .collect_vec();

        // a label repeated within one operand walks its diagonal; its extents must be equal
        for (labels, shape) in labels.iter().zip_eq(shapes) {
            let mut extents = BTreeMap::<Label, usize>::new();
            for (&label, &dim) in labels.iter().zip_eq(shape.iter()) {
                match *extents.entry(label).or_insert(dim) {
                    x if x == dim => {}
                    x => return Err(EinsumError::Size(label, x, dim)),
                }
            }
        }

        // size of each label; extents of `1` broadcast against any other size
        let mut sizes = BTreeMap::<Label, usize>::new();
        for (labels, shape) in labels.iter().zip_eq(shapes) {
            for (&label, &dim) in labels.iter().zip_eq(shape.iter()) {
                let size = sizes.entry(label).or_insert(dim);
                match (*size, dim) {
                    (x, y) if x == y => {}
                    (1, y) => *size = y,
                    (_, 1) => {}
                    (x, y) => return Err(EinsumError::Size(label, x, y)),
                }
            }
        }

        let output = match &self.output {
            Some(term) => {
                let output = term
                    .tokens
                    .iter()
                    .flat_map(|token| match *token {
                        Token::Named(c) => vec![Label::Named(c)],
                        Token::Ellipsis => (0..broadcast).map(Label::Ellipsis).collect(),
                    })
                    .collect_vec();
                if let Some(&label) = output.iter().find(|&label| !sizes.contains_key(label)) {
                    return Err(EinsumError::Output(label));
                }
                if let Some(&label) = output.iter().duplicates().next() {
                    return Err(EinsumError::Repeat(label));
                }
                output
            }
            None => {
                let counts = labels.iter().flatten().counts();
                sizes
                    .keys()
                    .filter(|label| match label {
                        Label::Ellipsis(_) => true,
                        Label::Named(_) => counts[label] == 1,
                    })
                    .copied()
                    .collect()
            }
        };
        let contracted = sizes
            .keys()
            .filter(|label| !output.contains(label))
            .copied()
            .collect_vec();

        // step of each label in each operand; repeated labels walk the diagonal
        let stride = |labels: &[Label], shape: &Shape, label: Label| -> usize {
            labels
                .iter()
                .zip_eq(shape.iter())
                .zip_eq(shape.contiguous_stride().iter())
                .filter(|&((&x, &dim), _)| x == label && dim != 1)
                .map(|(_, &stride)| stride)
                .sum()
        };
        let operands = labels
            .iter()
            .zip_eq(shapes)
            .map(|(labels, shape)| OperandPlan {
                output: output.iter().map(|&x| stride(labels, shape, x)).collect(),
                contracted: contracted.iter().map(|&x| stride(labels, shape, x)).collect(),
            })
            .collect();

        let output_shape = output.iter().map(|label| sizes[label]).collect_vec();
        let contracted_shape = contracted.iter().map(|label| sizes[label]).collect_vec();
        Ok(EinsumPlan {
            output: output_shape.into(),
            contracted: contracted_shape.into(),
            operands,
        })
    }
}

/// Per-operand strides along the output and contracted labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandPlan {
    pub output: Vec<usize>,
    pub contracted: Vec<usize>,
}

impl OperandPlan {
    /// Offsets of this operand at every output index.
    #[inline]
    pub fn output_offsets(&self, plan: &EinsumPlan) -> Vec<usize> {
        offsets(&plan.output, &self.output)
    }

    /// Offsets of this operand at every contracted index.
    #[inline]
    pub fn contracted_offsets(&self, plan: &EinsumPlan) -> Vec<usize> {
        offsets(&plan.contracted, &self.contracted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EinsumPlan {
    /// Shape of the result.
    pub output: Shape,
    /// Shape of the summed-over labels.
    pub contracted: Shape,
    pub operands: Vec<OperandPlan>,
}
