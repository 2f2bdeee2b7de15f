//! Entity catalog
//!
//! Every synced entity is one [`EntityDescriptor`]: where its pages come
//! from, how its watermark is laid out, how records become rows, and which
//! columns land in the destination table.

use crate::cursor::CursorCodec;
use crate::flatten::{FlattenStrategy, LevelSpec, TreeSpec};
use crate::schema::{ColumnSpec, TableSchema};
use crate::source::Endpoint;

use crate::schema::ColumnKind::{Bool, DateTime, Dynamic, Int, Long, Real, String as Str};

/// Record cap for entities that need one list fetch per page
pub const DEFAULT_RECORD_CAP: usize = 10_000;

/// Record cap for entities that fetch a full release per record
pub const DETAIL_RECORD_CAP: usize = 5_000;

/// Static description of one entity pipeline
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// Entity name; also the destination table and the watermark key
    pub name: &'static str,
    pub mapping_name: &'static str,
    pub endpoint: Endpoint,
    pub codec: CursorCodec,
    pub default_cap: usize,
    pub strategy: FlattenStrategy,
    pub columns: &'static [ColumnSpec],
}

impl EntityDescriptor {
    pub fn schema(&self) -> TableSchema {
        TableSchema::new(self.name, self.mapping_name, self.columns)
    }
}

// ============================================================================
// ReleaseDefinition
// ============================================================================

const DEFINITION_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("OrganizationName", Str, "$.OrganizationName"),
    ColumnSpec::new("ProjectId", Str, "$.ProjectId"),
    ColumnSpec::new("ReleaseDefinitionId", Long, "$.id"),
    ColumnSpec::new("ReleaseDefinitionRevision", Int, "$.revision"),
    ColumnSpec::new("ReleaseDefinitionName", Str, "$.name"),
    ColumnSpec::new("ReleaseDefinitionPath", Str, "$.path"),
    ColumnSpec::new("ReleaseDefinitionUrl", Str, "$.url"),
    ColumnSpec::new("ReleaseNameFormat", Str, "$.releaseNameFormat"),
    ColumnSpec::new("IsDeleted", Bool, "$.isDeleted"),
    ColumnSpec::new("Description", Str, "$.description"),
    ColumnSpec::new("Source", Str, "$.source"),
    ColumnSpec::new("CreatedByDisplayName", Str, "$.createdBy.displayName"),
    ColumnSpec::new("CreatedById", Str, "$.createdBy.id"),
    ColumnSpec::new("CreatedByUniqueName", Str, "$.createdBy.uniqueName"),
    ColumnSpec::new("CreatedOn", DateTime, "$.createdOn"),
    ColumnSpec::new("ModifiedByDisplayName", Str, "$.modifiedBy.displayName"),
    ColumnSpec::new("ModifiedById", Str, "$.modifiedBy.id"),
    ColumnSpec::new("ModifiedByUniqueName", Str, "$.modifiedBy.uniqueName"),
    ColumnSpec::new("ModifiedOn", DateTime, "$.modifiedOn"),
    ColumnSpec::new("PipelineProcessType", Str, "$.pipelineProcess.type"),
    ColumnSpec::new("Variables", Dynamic, "$.variables"),
];

// ============================================================================
// Release
// ============================================================================

const RELEASE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("OrganizationName", Str, "$.OrganizationName"),
    ColumnSpec::new("ProjectId", Str, "$.ProjectId"),
    ColumnSpec::new("ReleaseId", Long, "$.id"),
    ColumnSpec::new("ReleaseName", Str, "$.name"),
    ColumnSpec::new("CreatedByDisplayName", Str, "$.createdBy.displayName"),
    ColumnSpec::new("CreatedById", Str, "$.createdBy.id"),
    ColumnSpec::new("CreatedByUniqueName", Str, "$.createdBy.uniqueName"),
    ColumnSpec::new("CreatedOn", DateTime, "$.createdOn"),
    ColumnSpec::new("DefinitionSnapshotRevision", Int, "$.definitionSnapshotRevision"),
    ColumnSpec::new("Description", Str, "$.description"),
    ColumnSpec::new("KeepForever", Bool, "$.keepForever"),
    ColumnSpec::new("ModifiedByDisplayName", Str, "$.modifiedBy.displayName"),
    ColumnSpec::new("ModifiedById", Str, "$.modifiedBy.id"),
    ColumnSpec::new("ModifiedByUniqueName", Str, "$.modifiedBy.uniqueName"),
    ColumnSpec::new("ModifiedOn", DateTime, "$.modifiedOn"),
    ColumnSpec::new("Reason", Str, "$.reason"),
    ColumnSpec::new("ReleaseDefinitionId", Long, "$.releaseDefinition.id"),
    ColumnSpec::new("ReleaseDefinitionName", Str, "$.releaseDefinition.name"),
    ColumnSpec::new("ReleaseDefinitionPath", Str, "$.releaseDefinition.path"),
    ColumnSpec::new("ReleaseNameFormat", Str, "$.releaseNameFormat"),
    ColumnSpec::new("Status", Str, "$.status"),
    ColumnSpec::new("Variables", Dynamic, "$.variables"),
];

// ============================================================================
// ReleaseDeployment
// ============================================================================

const DEPLOYMENT_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("OrganizationName", Str, "$.OrganizationName"),
    ColumnSpec::new("ProjectId", Str, "$.ProjectId"),
    ColumnSpec::new("DeploymentId", Long, "$.id"),
    ColumnSpec::new("DefinitionEnvironmentId", Long, "$.definitionEnvironmentId"),
    ColumnSpec::new("ReleaseId", Long, "$.release.id"),
    ColumnSpec::new("ReleaseName", Str, "$.release.name"),
    ColumnSpec::new("ReleaseDefinitionId", Long, "$.releaseDefinition.id"),
    ColumnSpec::new("ReleaseDefinitionName", Str, "$.releaseDefinition.name"),
    ColumnSpec::new("ReleaseDefinitionPath", Str, "$.releaseDefinition.path"),
    ColumnSpec::new("ReleaseEnvironmentId", Long, "$.releaseEnvironment.id"),
    ColumnSpec::new("ReleaseEnvironmentName", Str, "$.releaseEnvironment.name"),
    ColumnSpec::new("StartedOn", DateTime, "$.startedOn"),
    ColumnSpec::new("QueuedOn", DateTime, "$.queuedOn"),
    ColumnSpec::new("CompletedOn", DateTime, "$.completedOn"),
    ColumnSpec::new("LastModifiedOn", DateTime, "$.lastModifiedOn"),
    ColumnSpec::new("Reason", Str, "$.reason"),
    ColumnSpec::new("OperationStatus", Str, "$.operationStatus"),
    ColumnSpec::new("DeploymentStatus", Str, "$.deploymentStatus"),
    ColumnSpec::new("RequestedByDisplayName", Str, "$.requestedBy.displayName"),
    ColumnSpec::new("RequestedById", Str, "$.requestedBy.id"),
    ColumnSpec::new("RequestedForDisplayName", Str, "$.requestedFor.displayName"),
    ColumnSpec::new("RequestedForId", Str, "$.requestedFor.id"),
    ColumnSpec::new("LastModifiedByDisplayName", Str, "$.lastModifiedBy.displayName"),
    ColumnSpec::new("LastModifiedById", Str, "$.lastModifiedBy.id"),
];

// ============================================================================
// ReleaseArtifact
// ============================================================================

const ARTIFACT_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("OrganizationName", Str, "$.OrganizationName"),
    ColumnSpec::new("ProjectId", Str, "$.ProjectId"),
    ColumnSpec::new("ReleaseId", Long, "$.ReleaseId"),
    ColumnSpec::new("SourceId", Str, "$.sourceId"),
    ColumnSpec::new("Type", Str, "$.type"),
    ColumnSpec::new("Alias", Str, "$.alias"),
    ColumnSpec::new("IsPrimary", Bool, "$.isPrimary"),
    ColumnSpec::new("DefinitionReferenceDefinitionId", Str, "$.definitionReference.definition.id"),
    ColumnSpec::new("DefinitionReferenceDefinitionName", Str, "$.definitionReference.definition.name"),
    ColumnSpec::new("DefinitionReferenceBranchId", Str, "$.definitionReference.branch.id"),
    ColumnSpec::new("DefinitionReferenceBranchName", Str, "$.definitionReference.branch.name"),
    ColumnSpec::new("DefinitionReferenceVersionId", Str, "$.definitionReference.version.id"),
    ColumnSpec::new("DefinitionReferenceVersionName", Str, "$.definitionReference.version.name"),
    ColumnSpec::new("DefinitionReferenceProjectId", Str, "$.definitionReference.project.id"),
    ColumnSpec::new("DefinitionReferenceProjectName", Str, "$.definitionReference.project.name"),
    ColumnSpec::new("DefinitionReferenceConnectionId", Str, "$.definitionReference.connection.id"),
    ColumnSpec::new("DefinitionReferenceConnectionName", Str, "$.definitionReference.connection.name"),
    ColumnSpec::new("DefinitionReferencePullRequestId", Str, "$.definitionReference.pullRequest.id"),
];

const ARTIFACT_LEVELS: &[LevelSpec] = &[LevelSpec::emitting("artifacts", "ReleaseArtifact", "sourceId")];

const ARTIFACT_TREE: TreeSpec = TreeSpec {
    root_lineage: &[("ReleaseId", "id")],
    levels: ARTIFACT_LEVELS,
};

// ============================================================================
// ReleaseEnvironment
// ============================================================================

const ENVIRONMENT_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("OrganizationName", Str, "$.OrganizationName"),
    ColumnSpec::new("ProjectId", Str, "$.ProjectId"),
    ColumnSpec::new("ReleaseEnvironmentId", Long, "$.id"),
    ColumnSpec::new("ReleaseEnvironmentName", Str, "$.name"),
    ColumnSpec::new("ReleaseDefinitionEnvironmentId", Long, "$.definitionEnvironmentId"),
    ColumnSpec::new("ReleaseId", Long, "$.releaseId"),
    ColumnSpec::new("ReleaseName", Str, "$.release.name"),
    ColumnSpec::new("ReleaseDefinitionId", Int, "$.releaseDefinition.id"),
    ColumnSpec::new("ReleaseDefinitionName", Str, "$.releaseDefinition.name"),
    ColumnSpec::new("ReleaseDefinitionPath", Str, "$.releaseDefinition.path"),
    ColumnSpec::new("ModifiedOn", DateTime, "$.modifiedOn"),
    ColumnSpec::new("CreatedOn", DateTime, "$.createdOn"),
    ColumnSpec::new("EnvironmentOptions", Dynamic, "$.environmentOptions"),
    ColumnSpec::new("NextScheduledUtcTime", DateTime, "$.nextScheduledUtcTime"),
    ColumnSpec::new("OwnerDisplayName", Str, "$.owner.displayName"),
    ColumnSpec::new("OwnerId", Str, "$.owner.id"),
    ColumnSpec::new("OwnerUniqueName", Str, "$.owner.uniqueName"),
    ColumnSpec::new("Rank", Int, "$.rank"),
    ColumnSpec::new("ReleaseCreatedByDisplayName", Str, "$.releaseCreatedBy.displayName"),
    ColumnSpec::new("ReleaseCreatedById", Str, "$.releaseCreatedBy.id"),
    ColumnSpec::new("Status", Str, "$.status"),
    ColumnSpec::new("TimeToDeploy", Real, "$.timeToDeploy"),
    ColumnSpec::new("TriggerReason", Str, "$.triggerReason"),
];

const ENVIRONMENT_LEVELS: &[LevelSpec] = &[LevelSpec::emitting("environments", "ReleaseEnvironment", "id")
    .strip(&["deploySteps", "deployPhasesSnapshot", "preDeployApprovals", "postDeployApprovals"])];

const ENVIRONMENT_TREE: TreeSpec = TreeSpec {
    root_lineage: &[],
    levels: ENVIRONMENT_LEVELS,
};

// ============================================================================
// ReleaseTimelineRecord
// ============================================================================

const TIMELINE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("OrganizationName", Str, "$.OrganizationName"),
    ColumnSpec::new("ProjectId", Str, "$.ProjectId"),
    ColumnSpec::new("ReleaseEnvironmentId", Long, "$.ReleaseEnvironmentId"),
    ColumnSpec::new("ReleaseId", Long, "$.ReleaseId"),
    ColumnSpec::new("ReleaseTimelineId", Str, "$.ReleaseTimelineId"),
    ColumnSpec::new("RecordId", Str, "$.RowId"),
    ColumnSpec::new("RecordName", Str, "$.name"),
    ColumnSpec::new("ParentId", Str, "$.ParentId"),
    ColumnSpec::new("StartTime", DateTime, "$.startTime"),
    ColumnSpec::new("FinishTime", DateTime, "$.finishTime"),
    ColumnSpec::new("LogUrl", Str, "$.logUrl"),
    ColumnSpec::new("Type", Str, "$.Type"),
    ColumnSpec::new("Status", Str, "$.status"),
    ColumnSpec::new("TaskId", Str, "$.task.id"),
    ColumnSpec::new("TaskName", Str, "$.task.name"),
    ColumnSpec::new("TaskVersion", Str, "$.task.version"),
    ColumnSpec::new("ErrorMessage", Dynamic, "$.issues"),
];

const TIMELINE_TASKS: &[LevelSpec] = &[LevelSpec::emitting("tasks", "Task", "timelineRecordId")];

const TIMELINE_JOBS: &[LevelSpec] = &[LevelSpec::emitting("deploymentJobs", "Job", "timelineRecordId")
    .payload("job")
    .children(TIMELINE_TASKS)];

const TIMELINE_PHASES: &[LevelSpec] = &[LevelSpec::emitting("releaseDeployPhases", "Phase", "runPlanId")
    .lineage(&[("ReleaseTimelineId", "runPlanId")])
    .strip(&["deploymentJobs"])
    .children(TIMELINE_JOBS)];

const TIMELINE_STEPS: &[LevelSpec] = &[LevelSpec::structural("deploySteps").children(TIMELINE_PHASES)];

const TIMELINE_ENVIRONMENTS: &[LevelSpec] = &[LevelSpec::structural("environments")
    .lineage(&[("ReleaseId", "releaseId"), ("ReleaseEnvironmentId", "id")])
    .children(TIMELINE_STEPS)];

/// Environment, deploy step, phase, job, task
pub const TIMELINE_TREE: TreeSpec = TreeSpec {
    root_lineage: &[],
    levels: TIMELINE_ENVIRONMENTS,
};

// ============================================================================
// Catalog
// ============================================================================

const CATALOG: &[EntityDescriptor] = &[
    EntityDescriptor {
        name: "ReleaseDefinition",
        mapping_name: "ReleaseDefinition_mapping",
        endpoint: Endpoint::Definitions,
        codec: CursorCodec::TokenOnly,
        default_cap: DEFAULT_RECORD_CAP,
        strategy: FlattenStrategy::Shallow {
            tag: "ReleaseDefinition",
        },
        columns: DEFINITION_COLUMNS,
    },
    EntityDescriptor {
        name: "Release",
        mapping_name: "Release_mapping",
        endpoint: Endpoint::Releases {
            expand: Some("variables"),
        },
        codec: CursorCodec::TokenAndBoundary { field: "createdOn" },
        default_cap: DEFAULT_RECORD_CAP,
        strategy: FlattenStrategy::Shallow { tag: "Release" },
        columns: RELEASE_COLUMNS,
    },
    EntityDescriptor {
        name: "ReleaseDeployment",
        mapping_name: "ReleaseDeployment_mapping",
        endpoint: Endpoint::Deployments,
        codec: CursorCodec::TokenAndBoundary {
            field: "lastModifiedOn",
        },
        default_cap: DEFAULT_RECORD_CAP,
        strategy: FlattenStrategy::Shallow {
            tag: "ReleaseDeployment",
        },
        columns: DEPLOYMENT_COLUMNS,
    },
    EntityDescriptor {
        name: "ReleaseArtifact",
        mapping_name: "ReleaseArtifact_mapping",
        endpoint: Endpoint::Releases {
            expand: Some("artifacts"),
        },
        codec: CursorCodec::TokenAndBoundary { field: "createdOn" },
        default_cap: DEFAULT_RECORD_CAP,
        strategy: FlattenStrategy::Tree(ARTIFACT_TREE),
        columns: ARTIFACT_COLUMNS,
    },
    EntityDescriptor {
        name: "ReleaseEnvironment",
        mapping_name: "ReleaseEnvironment_mapping",
        endpoint: Endpoint::Releases { expand: None },
        codec: CursorCodec::TokenAndBoundary { field: "createdOn" },
        default_cap: DEFAULT_RECORD_CAP,
        strategy: FlattenStrategy::Detail(ENVIRONMENT_TREE),
        columns: ENVIRONMENT_COLUMNS,
    },
    EntityDescriptor {
        name: "ReleaseTimelineRecord",
        mapping_name: "ReleaseTimelineRecord_mapping",
        endpoint: Endpoint::Releases {
            expand: Some("environments"),
        },
        codec: CursorCodec::TokenAndBoundary { field: "createdOn" },
        default_cap: DETAIL_RECORD_CAP,
        strategy: FlattenStrategy::Detail(TIMELINE_TREE),
        columns: TIMELINE_COLUMNS,
    },
];

/// All known entities, in bootstrap order
pub fn catalog() -> &'static [EntityDescriptor] {
    CATALOG
}

/// Look up an entity by name, ignoring case
pub fn find(name: &str) -> Option<&'static EntityDescriptor> {
    CATALOG.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}
