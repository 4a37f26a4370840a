//! # cosim-config - co-simulation workflow configuration
//!
//! Reads the XML files describing a co-simulation run and turns them into the command lines
//! that start each simulator.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `cosim-config` works internally.
//!
//! ### Structured XML
//!
//! Every file is plain XML where elements declare the type of their content:
//!
//! ```xml
//! <co_simulation_action_plan>
//!   <variables datatype="DICTIONARY">
//!     <CO_SIM_RESULTS_PATH datatype="STRING">${HOME}/results</CO_SIM_RESULTS_PATH>
//!   </variables>
//!   <neuron model="iaf_cond_alpha">
//!     <C_m datatype="FLOAT">250.0</C_m>
//!     <spikes datatype="ARRAY" dtype="INT" sep=",">1,2,3</spikes>
//!   </neuron>
//! </co_simulation_action_plan>
//! ```
//!
//! - `datatype` is one of `INT`, `FLOAT`, `STRING`, `DICTIONARY` or `ARRAY`
//! - `model="..."` turns an element into a named record ([value::ConfigValue::Model])
//! - elements with neither are transparent: their children end up one level up
//!
//! [xml_parser::StructuredXmlParser] produces a [value::Dictionary] from such a file. Unknown
//! datatypes become null values, unless [xml_parser::ParseOptions::strict] is set.
//!
//! ### Variables
//!
//! [variables::VariableRegistry] holds the `CO_SIM_*` variables of a run. Values can refer to
//! each other and to the OS environment:
//!
//! | **form**           | **resolved from**                      |
//! |--------------------|----------------------------------------|
//! | `${HOME}`          | OS environment ([environment])         |
//! | `{CO_SIM_NAME}`    | registry                               |
//! | `CO_SIM_NAME`      | registry                               |
//!
//! References are replaced in a single pass, see [resolver::ReferenceResolver]. The order in
//! which variables are assigned therefore matters.
//!
//! When running on a SLURM allocation, [cluster] expands `SLURM_NODELIST` into one
//! `CO_SIM_SLURM_NODE_###` variable per node.
//!
//! ### Action plans
//!
//! The action plan lists actions. Each executable action refers to a file describing its
//! launcher, performer and routine. [action_plan::ActionPlanCompiler] resolves those into one
//! argument vector per action.
//!
//! [workflow::Workflow] runs all of the above in order for one plan file.
//!
pub mod action_plan;
pub mod cluster;
pub mod comm_settings;
pub mod deployment;
pub mod environment;
pub mod resolver;
pub mod value;
pub mod variables;
pub mod workflow;
pub mod xml_parser;
